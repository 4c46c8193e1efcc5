pub mod balance;
pub mod domain;
pub mod migrate;
pub mod ports;
pub mod rotation;
pub mod week;

pub use balance::{BalanceError, MonthlyStatus, PaymentStatus, Settlement, WeeklyBalance};
pub use domain::{
    AppData, ArchivedWeek, Debt, ExtraCharge, Group, GroupRotation, LedgerEntry, MonthlyBill,
    MonthlyLedger, MonthlySettings, Payment, Task, User,
};
pub use ports::{BackupInfo, PortError, PortResult, StateStore};
