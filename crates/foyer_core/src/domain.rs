//! crates/foyer_core/src/domain.rs
//!
//! Defines the shared household document and its record types.
//! These structs are independent of any storage backend or transport;
//! the serde derives define the persisted and wire shape of the document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the persisted document shape. Bumped whenever a
/// migration step is added in [`crate::migrate`].
pub const SCHEMA_VERSION: u32 = 2;

/// A household member. One canonical shape everywhere: legacy bare-string
/// rosters are promoted to this at load time, never sniffed at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A weekly cash contribution. At most one effective payment per user per
/// week: inserting a new one drops any prior record by the same user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub week: String,
}

/// An ad-hoc purchase made by a member on behalf of the house.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub amount: f64,
    pub description: String,
    pub date: DateTime<Utc>,
    pub week: String,
}

/// One of the three rotating chores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Marche,
    Poulet,
    Repos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub task: Task,
    pub members: Vec<String>,
}

/// Reference point for the chore rotation. `start_week` is an ISO week
/// number set once (or on explicit reset); resetting changes all future
/// assignments but never rewrites past ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRotation {
    #[serde(rename = "startWeek")]
    pub start_week: Option<i64>,
    #[serde(rename = "rotationOrder")]
    pub rotation_order: [Task; 3],
}

impl Default for GroupRotation {
    fn default() -> Self {
        Self {
            start_week: None,
            rotation_order: [Task::Marche, Task::Poulet, Task::Repos],
        }
    }
}

/// A named extra charge on a monthly bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraCharge {
    pub nom: String,
    pub montant: f64,
}

/// The fixed charges for one month.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonthlyBill {
    pub loyer: f64,
    pub electricite: f64,
    pub eau: f64,
    pub gaz: f64,
    pub imprevus: f64,
    #[serde(default)]
    pub autres: Vec<ExtraCharge>,
}

/// One entry in a member's monthly payment ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub amount: f64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
}

/// A member's accumulated payments against their monthly share.
/// Additive, unlike the weekly payment map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonthlyLedger {
    pub paid: f64,
    pub remaining: f64,
    #[serde(default)]
    pub payments: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySettings {
    #[serde(rename = "loyerDefaut")]
    pub loyer_defaut: f64,
}

impl Default for MonthlySettings {
    fn default() -> Self {
        Self {
            loyer_defaut: 4500.0,
        }
    }
}

/// Frozen copy of one week's records, written by the archival routine.
/// Overwritten only by re-archival of the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedWeek {
    pub payments: BTreeMap<String, Payment>,
    pub debts: BTreeMap<String, Vec<Debt>>,
    #[serde(rename = "weeklyAmount")]
    pub weekly_amount: f64,
    pub users: Vec<User>,
    #[serde(rename = "archivedAt")]
    pub archived_at: DateTime<Utc>,
}

/// The root shared document. A single instance lives in the server process
/// for its whole lifetime, persisted under the fixed id `"main"`.
///
/// `payments` is keyed week -> payment id -> payment; `debts` is keyed
/// week -> user name -> list of debts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppData {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: u32,
    #[serde(rename = "adminPassword")]
    pub admin_password: String,
    #[serde(rename = "weeklyAmount")]
    pub weekly_amount: f64,
    #[serde(rename = "siteTitle")]
    pub site_title: String,
    #[serde(default)]
    pub users: Vec<User>,
    /// ISO date of this week's Monday. Recomputed from wall-clock time on
    /// every load; the stored value is advisory only.
    #[serde(rename = "currentWeek", default)]
    pub current_week: String,
    #[serde(default)]
    pub payments: BTreeMap<String, BTreeMap<String, Payment>>,
    #[serde(default)]
    pub debts: BTreeMap<String, BTreeMap<String, Vec<Debt>>>,
    #[serde(default)]
    pub history: BTreeMap<String, ArchivedWeek>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(rename = "groupRotation", default)]
    pub group_rotation: GroupRotation,
    #[serde(rename = "monthlyBills", default)]
    pub monthly_bills: BTreeMap<String, MonthlyBill>,
    #[serde(rename = "monthlyPayments", default)]
    pub monthly_payments: BTreeMap<String, BTreeMap<String, MonthlyLedger>>,
    #[serde(rename = "monthlySettings", default)]
    pub monthly_settings: MonthlySettings,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            admin_password: "admin123".to_string(),
            weekly_amount: 100.0,
            site_title: "Gestion Cotisation".to_string(),
            users: Vec::new(),
            current_week: String::new(),
            payments: BTreeMap::new(),
            debts: BTreeMap::new(),
            history: BTreeMap::new(),
            groups: Vec::new(),
            group_rotation: GroupRotation::default(),
            monthly_bills: BTreeMap::new(),
            monthly_payments: BTreeMap::new(),
            monthly_settings: MonthlySettings::default(),
        }
    }
}

impl AppData {
    /// Looks up a user by id, falling back to the name for records created
    /// before ids existed.
    pub fn find_user(&self, id_or_name: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.id == id_or_name || u.name == id_or_name)
    }

    /// Whether `name` belongs to some active user.
    pub fn has_user_named(&self, name: &str) -> bool {
        self.users.iter().any(|u| u.name == name)
    }

    /// The effective payment for a user in a week, if any. With id-keyed
    /// storage there is at most one record per user (mutation drops prior
    /// ones), so the first match is the effective one.
    pub fn payment_for<'a>(&'a self, week: &str, user_name: &str) -> Option<&'a Payment> {
        self.payments
            .get(week)?
            .values()
            .find(|p| p.user_name == user_name)
    }

    /// A user's debts for a week (empty slice when none).
    pub fn debts_for<'a>(&'a self, week: &str, user_name: &str) -> &'a [Debt] {
        self.debts
            .get(week)
            .and_then(|m| m.get(user_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
