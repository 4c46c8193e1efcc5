//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser clients and
//! the API server for the shared household document.

use foyer_core::domain::{
    AppData, Debt, Group, GroupRotation, LedgerEntry, MonthlyBill, MonthlyLedger, Payment, User,
};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
/// Every mutation is field-scoped except `updateData`, the guarded
/// last-writer-wins wholesale replace.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Wholesale document replace. The most recently applied replace wins;
    /// there is no merge with concurrent field-scoped updates.
    UpdateData { data: AppData },

    UserAdded { user: User },
    UserUpdated { user: User },
    UserDeleted { user_id: String },

    PaymentAdded { payment: Payment },

    /// An ad-hoc purchase fronted by a member. Rebroadcast as `debtAdded`.
    Debt { data: Debt, user_name: String },

    GroupAdded { group: Group },
    GroupUpdated { group: Group },
    GroupDeleted { group_id: String },

    RotationReset { rotation: GroupRotation },

    BillSaved { month: String, bill: MonthlyBill },
    MonthlyPaymentAdded {
        month: String,
        user_name: String,
        entry: LedgerEntry,
    },

    SettingsUpdated {
        weekly_amount: Option<f64>,
        site_title: Option<String>,
        admin_password: Option<String>,
    },

    /// Asks the server to resend the full document to this client.
    RequestData,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The full document, pushed once to each newly connected client (and in
    /// reply to `requestData`). The only consistent baseline a client gets.
    InitialData { data: AppData },

    /// The full document after a wholesale replace, broadcast to every
    /// client except the sender.
    DataUpdated { data: AppData },

    /// Sent to the sender only, after `updateData`.
    UpdateConfirmed {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    UserAdded { user: User },
    UserUpdated { user: User },
    UserDeleted { user_id: String },

    PaymentAdded { payment: Payment },
    DebtAdded { debt: Debt, user_name: String },

    GroupAdded { group: Group },
    GroupUpdated { group: Group },
    GroupDeleted { group_id: String },

    RotationReset { rotation: GroupRotation },

    BillSaved { month: String, bill: MonthlyBill },
    MonthlyPaymentAdded {
        month: String,
        user_name: String,
        ledger: MonthlyLedger,
    },

    /// Current settings after a field-scoped settings mutation. The shared
    /// password travels here like it does in the full document pushes; it is
    /// household data, not a security boundary.
    SettingsUpdated {
        weekly_amount: f64,
        site_title: String,
        admin_password: String,
    },

    /// Broadcast after the weekly archival routine runs.
    WeeklyArchived {
        week: String,
        archived_at: chrono::DateTime<chrono::Utc>,
        message: String,
    },

    /// Reports a rejected mutation to the client that sent it.
    Error { message: String },
}
