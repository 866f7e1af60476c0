//! Read-only directory records (users, vendors, menu items)
//!
//! Owned by the surrounding application; the ledger core only looks them up.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{MenuItemId, UserId, VendorId};

/// Role attached to a user by the identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Vendor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// User account as seen by the core
#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: UserId,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
}

impl UserAccount {
    /// Eligible to pay for meals
    pub fn is_active_student(&self) -> bool {
        self.role == Role::Student && self.is_active
    }
}

/// Vendor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorType {
    Mess,
    Canteen,
}

impl VendorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorType::Mess => "mess",
            VendorType::Canteen => "canteen",
        }
    }
}

impl FromStr for VendorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mess" => Ok(VendorType::Mess),
            "canteen" => Ok(VendorType::Canteen),
            other => Err(format!("unknown vendor type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Vendor {
    pub id: VendorId,
    /// Operator account allowed to display counter codes for this vendor
    pub owner_user_id: Option<UserId>,
    pub vendor_code: String,
    pub name: String,
    pub vendor_type: VendorType,
    pub is_active: bool,
}

impl Vendor {
    pub fn is_operated_by(&self, user_id: UserId) -> bool {
        self.owner_user_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub vendor_id: VendorId,
    pub name: String,
    pub price: Decimal,
    /// breakfast / lunch / snacks / dinner ...
    pub meal_type: String,
    pub is_available: bool,
}

impl MenuItem {
    /// Sellable by `vendor_id` right now
    pub fn is_sellable_by(&self, vendor_id: VendorId) -> bool {
        self.vendor_id == vendor_id && self.is_available
    }
}
