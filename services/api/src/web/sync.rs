//! services/api/src/web/sync.rs
//!
//! The canonical-state task. One spawned task owns the shared document;
//! every mutation arrives as a command on an mpsc queue and is applied and
//! persisted to completion before the next command is taken. Handlers never
//! touch the document directly, which closes the lost-update race a shared
//! mutable document would have across await points.
//!
//! Every mutation persists before it broadcasts: a failed save leaves the
//! in-memory document unchanged and nothing reaches the other clients.

use crate::web::protocol::ServerMessage;
use chrono::{DateTime, Utc};
use foyer_core::balance::{per_person_share, remaining_share};
use foyer_core::domain::{
    AppData, ArchivedWeek, Debt, Group, GroupRotation, LedgerEntry, MonthlyBill, MonthlyLedger,
    Payment, User, SCHEMA_VERSION,
};
use foyer_core::ports::StateStore;
use foyer_core::week;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Why a mutation was rejected. Validation and not-found rejections never
/// mutate state; persistence failures roll the working copy back.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("sync task is not running")]
    Closed,
}

pub type SyncResult<T> = Result<T, SyncError>;

/// A server event fanned out to connected clients. `skip` carries the
/// originating connection for events scoped to "every other client".
#[derive(Debug, Clone)]
pub struct Outbound {
    pub skip: Option<Uuid>,
    pub message: ServerMessage,
}

/// Proof that the archival routine ran for a week.
#[derive(Debug, Clone)]
pub struct ArchiveReceipt {
    pub week: String,
    pub archived_at: DateTime<Utc>,
}

type Reply<T> = oneshot::Sender<SyncResult<T>>;

enum Command {
    Snapshot { reply: oneshot::Sender<AppData> },
    ReplaceAll { data: Box<AppData>, origin: Option<Uuid>, reply: Reply<()> },
    AddUser { user: User, reply: Reply<()> },
    UpdateUser { user: User, reply: Reply<()> },
    DeleteUser { user_id: String, reply: Reply<()> },
    AddPayment { payment: Payment, reply: Reply<()> },
    AddDebt { debt: Debt, user_name: String, reply: Reply<()> },
    AddGroup { group: Group, reply: Reply<()> },
    UpdateGroup { group: Group, reply: Reply<()> },
    DeleteGroup { group_id: String, reply: Reply<()> },
    ResetRotation { rotation: GroupRotation, reply: Reply<()> },
    SaveBill { month: String, bill: MonthlyBill, reply: Reply<()> },
    AddMonthlyPayment {
        month: String,
        user_name: String,
        entry: LedgerEntry,
        reply: Reply<()>,
    },
    UpdateSettings {
        weekly_amount: Option<f64>,
        site_title: Option<String>,
        admin_password: Option<String>,
        reply: Reply<()>,
    },
    ArchiveWeek { reply: Reply<Option<ArchiveReceipt>> },
    Backup { reply: Reply<String> },
}

/// Cheap-to-clone handle used by HTTP handlers, WebSocket connections and
/// the scheduler to reach the canonical-state task.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<Outbound>,
}

impl SyncHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SyncResult<AppData> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    pub async fn replace_all(&self, data: AppData, origin: Option<Uuid>) -> SyncResult<()> {
        self.request(|reply| Command::ReplaceAll {
            data: Box::new(data),
            origin,
            reply,
        })
        .await
    }

    pub async fn add_user(&self, user: User) -> SyncResult<()> {
        self.request(|reply| Command::AddUser { user, reply }).await
    }

    pub async fn update_user(&self, user: User) -> SyncResult<()> {
        self.request(|reply| Command::UpdateUser { user, reply }).await
    }

    pub async fn delete_user(&self, user_id: String) -> SyncResult<()> {
        self.request(|reply| Command::DeleteUser { user_id, reply }).await
    }

    pub async fn add_payment(&self, payment: Payment) -> SyncResult<()> {
        self.request(|reply| Command::AddPayment { payment, reply }).await
    }

    pub async fn add_debt(&self, debt: Debt, user_name: String) -> SyncResult<()> {
        self.request(|reply| Command::AddDebt { debt, user_name, reply }).await
    }

    pub async fn add_group(&self, group: Group) -> SyncResult<()> {
        self.request(|reply| Command::AddGroup { group, reply }).await
    }

    pub async fn update_group(&self, group: Group) -> SyncResult<()> {
        self.request(|reply| Command::UpdateGroup { group, reply }).await
    }

    pub async fn delete_group(&self, group_id: String) -> SyncResult<()> {
        self.request(|reply| Command::DeleteGroup { group_id, reply }).await
    }

    pub async fn reset_rotation(&self, rotation: GroupRotation) -> SyncResult<()> {
        self.request(|reply| Command::ResetRotation { rotation, reply }).await
    }

    pub async fn save_bill(&self, month: String, bill: MonthlyBill) -> SyncResult<()> {
        self.request(|reply| Command::SaveBill { month, bill, reply }).await
    }

    pub async fn add_monthly_payment(
        &self,
        month: String,
        user_name: String,
        entry: LedgerEntry,
    ) -> SyncResult<()> {
        self.request(|reply| Command::AddMonthlyPayment {
            month,
            user_name,
            entry,
            reply,
        })
        .await
    }

    pub async fn update_settings(
        &self,
        weekly_amount: Option<f64>,
        site_title: Option<String>,
        admin_password: Option<String>,
    ) -> SyncResult<()> {
        self.request(|reply| Command::UpdateSettings {
            weekly_amount,
            site_title,
            admin_password,
            reply,
        })
        .await
    }

    pub async fn archive_week(&self) -> SyncResult<Option<ArchiveReceipt>> {
        self.request(|reply| Command::ArchiveWeek { reply }).await
    }

    pub async fn backup(&self) -> SyncResult<String> {
        self.request(|reply| Command::Backup { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> SyncResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)?
    }
}

/// Spawns the canonical-state task and returns its handle.
pub fn spawn(store: Arc<dyn StateStore>, initial: AppData) -> SyncHandle {
    let (tx, rx) = mpsc::channel(64);
    let (events, _) = broadcast::channel(64);
    let handle = SyncHandle {
        tx,
        events: events.clone(),
    };
    tokio::spawn(run(store, initial, rx, events));
    handle
}

async fn run(
    store: Arc<dyn StateStore>,
    mut doc: AppData,
    mut rx: mpsc::Receiver<Command>,
    events: broadcast::Sender<Outbound>,
) {
    info!("Canonical-state task started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Snapshot { reply } => {
                let _ = reply.send(doc.clone());
            }
            Command::Backup { reply } => {
                let result = store
                    .create_backup(&doc)
                    .await
                    .map_err(|e| SyncError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
            Command::ArchiveWeek { reply } => {
                let result = archive_week(&store, &mut doc, &events).await;
                let _ = reply.send(result);
            }
            Command::ReplaceAll { data, origin, reply } => {
                let result =
                    commit(&store, &mut doc, &events, origin, |working| {
                        replace_all(working, *data)
                    })
                    .await;
                let _ = reply.send(result);
            }
            Command::AddUser { user, reply } => {
                let _ = reply.send(commit(&store, &mut doc, &events, None, |w| add_user(w, user)).await);
            }
            Command::UpdateUser { user, reply } => {
                let _ = reply.send(commit(&store, &mut doc, &events, None, |w| update_user(w, user)).await);
            }
            Command::DeleteUser { user_id, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| delete_user(w, &user_id)).await,
                );
            }
            Command::AddPayment { payment, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| add_payment(w, payment)).await,
                );
            }
            Command::AddDebt { debt, user_name, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| add_debt(w, debt, user_name))
                        .await,
                );
            }
            Command::AddGroup { group, reply } => {
                let _ = reply.send(commit(&store, &mut doc, &events, None, |w| add_group(w, group)).await);
            }
            Command::UpdateGroup { group, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| update_group(w, group)).await,
                );
            }
            Command::DeleteGroup { group_id, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| delete_group(w, &group_id)).await,
                );
            }
            Command::ResetRotation { rotation, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| reset_rotation(w, rotation))
                        .await,
                );
            }
            Command::SaveBill { month, bill, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| save_bill(w, month, bill)).await,
                );
            }
            Command::AddMonthlyPayment { month, user_name, entry, reply } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| {
                        add_monthly_payment(w, month, user_name, entry)
                    })
                    .await,
                );
            }
            Command::UpdateSettings {
                weekly_amount,
                site_title,
                admin_password,
                reply,
            } => {
                let _ = reply.send(
                    commit(&store, &mut doc, &events, None, |w| {
                        update_settings(w, weekly_amount, site_title, admin_password)
                    })
                    .await,
                );
            }
        }
    }

    info!("Canonical-state task stopped");
}

/// What a mutation asks the loop to do after it succeeded.
enum Applied {
    /// Persist the working copy and broadcast the event.
    Broadcast(ServerMessage),
    /// Nothing changed (idempotent redelivery); still broadcast so clients
    /// that missed the first delivery converge, but skip the save.
    Unchanged(ServerMessage),
}

/// Runs one mutation against a working copy, persists it, then commits and
/// broadcasts. A persistence failure discards the working copy.
async fn commit(
    store: &Arc<dyn StateStore>,
    doc: &mut AppData,
    events: &broadcast::Sender<Outbound>,
    skip: Option<Uuid>,
    mutate: impl FnOnce(&mut AppData) -> SyncResult<Applied>,
) -> SyncResult<()> {
    let mut working = doc.clone();
    let applied = mutate(&mut working)?;

    let message = match applied {
        Applied::Broadcast(message) => {
            if let Err(e) = store.save_app_data(&working).await {
                error!("Mutation not committed, save failed: {}", e);
                return Err(SyncError::Persistence(e.to_string()));
            }
            *doc = working;
            message
        }
        Applied::Unchanged(message) => message,
    };

    // Lagging subscribers miss events; they resync via requestData.
    let _ = events.send(Outbound { skip, message });
    Ok(())
}

//=========================================================================================
// Mutations
//=========================================================================================

fn replace_all(working: &mut AppData, mut data: AppData) -> SyncResult<Applied> {
    if !(data.weekly_amount > 0.0) {
        return Err(SyncError::Validation(
            "weeklyAmount must be positive".to_string(),
        ));
    }
    // Never trust the stored/transmitted week; recompute from wall clock.
    data.current_week = week::week_key(Utc::now());
    data.schema_version = SCHEMA_VERSION;
    *working = data;
    Ok(Applied::Broadcast(ServerMessage::DataUpdated {
        data: working.clone(),
    }))
}

fn add_user(working: &mut AppData, user: User) -> SyncResult<Applied> {
    if user.name.trim().is_empty() {
        return Err(SyncError::Validation("user name must not be empty".to_string()));
    }
    if working.users.iter().any(|u| u.id == user.id) {
        // Idempotent on id: redelivery of the same event is not a duplicate.
        info!("User {} already present, ignoring duplicate add", user.id);
        return Ok(Applied::Unchanged(ServerMessage::UserAdded { user }));
    }
    if working.has_user_named(&user.name) {
        return Err(SyncError::Validation(format!(
            "a user named '{}' already exists",
            user.name
        )));
    }
    working.users.push(user.clone());
    Ok(Applied::Broadcast(ServerMessage::UserAdded { user }))
}

fn update_user(working: &mut AppData, user: User) -> SyncResult<Applied> {
    if user.name.trim().is_empty() {
        return Err(SyncError::Validation("user name must not be empty".to_string()));
    }
    let Some(existing) = working.users.iter_mut().find(|u| u.id == user.id) else {
        return Err(SyncError::NotFound(format!("no user with id {}", user.id)));
    };
    *existing = user.clone();
    Ok(Applied::Broadcast(ServerMessage::UserUpdated { user }))
}

fn delete_user(working: &mut AppData, user_id: &str) -> SyncResult<Applied> {
    let Some(user) = working.find_user(user_id).cloned() else {
        return Err(SyncError::NotFound(format!("no user with id {}", user_id)));
    };
    working.users.retain(|u| u.id != user.id);

    // Weekly payments and history are pruned; debts and monthly ledgers
    // are kept on purpose: they record money already fronted or paid.
    for week in working.payments.values_mut() {
        week.retain(|_, p| p.user_name != user.name);
    }
    for archived in working.history.values_mut() {
        archived.payments.retain(|_, p| p.user_name != user.name);
        archived.users.retain(|u| u.id != user.id);
    }

    Ok(Applied::Broadcast(ServerMessage::UserDeleted {
        user_id: user.id,
    }))
}

fn add_payment(working: &mut AppData, payment: Payment) -> SyncResult<Applied> {
    if !(payment.amount >= 0.0) || !payment.amount.is_finite() {
        return Err(SyncError::Validation("payment amount must be >= 0".to_string()));
    }
    if payment.week.is_empty() {
        return Err(SyncError::Validation("payment week is required".to_string()));
    }
    if !working.has_user_named(&payment.user_name) {
        return Err(SyncError::Validation(format!(
            "unknown user '{}'",
            payment.user_name
        )));
    }

    let week = working.payments.entry(payment.week.clone()).or_default();
    // One effective contribution per user per week: a new payment replaces
    // any prior record by the same user.
    week.retain(|_, p| p.user_name != payment.user_name);
    week.insert(payment.id.clone(), payment.clone());

    Ok(Applied::Broadcast(ServerMessage::PaymentAdded { payment }))
}

fn add_debt(working: &mut AppData, mut debt: Debt, user_name: String) -> SyncResult<Applied> {
    if !(debt.amount > 0.0) || !debt.amount.is_finite() {
        return Err(SyncError::Validation("debt amount must be > 0".to_string()));
    }
    if !working.has_user_named(&user_name) {
        return Err(SyncError::Validation(format!("unknown user '{}'", user_name)));
    }
    if debt.description.trim().is_empty() {
        debt.description = "Achat imprévu".to_string();
    }

    working
        .debts
        .entry(debt.week.clone())
        .or_default()
        .entry(user_name.clone())
        .or_default()
        .push(debt.clone());

    Ok(Applied::Broadcast(ServerMessage::DebtAdded { debt, user_name }))
}

fn add_group(working: &mut AppData, group: Group) -> SyncResult<Applied> {
    if group.name.trim().is_empty() {
        return Err(SyncError::Validation("group name must not be empty".to_string()));
    }
    if group.members.is_empty() {
        return Err(SyncError::Validation(
            "a group needs at least one member".to_string(),
        ));
    }
    if working.groups.iter().any(|g| g.id == group.id) {
        info!("Group {} already present, ignoring duplicate add", group.id);
        return Ok(Applied::Unchanged(ServerMessage::GroupAdded { group }));
    }
    working.groups.push(group.clone());
    Ok(Applied::Broadcast(ServerMessage::GroupAdded { group }))
}

fn update_group(working: &mut AppData, group: Group) -> SyncResult<Applied> {
    let Some(existing) = working.groups.iter_mut().find(|g| g.id == group.id) else {
        return Err(SyncError::NotFound(format!("no group with id {}", group.id)));
    };
    *existing = group.clone();
    Ok(Applied::Broadcast(ServerMessage::GroupUpdated { group }))
}

fn delete_group(working: &mut AppData, group_id: &str) -> SyncResult<Applied> {
    let before = working.groups.len();
    working.groups.retain(|g| g.id != group_id);
    if working.groups.len() == before {
        return Err(SyncError::NotFound(format!("no group with id {}", group_id)));
    }
    Ok(Applied::Broadcast(ServerMessage::GroupDeleted {
        group_id: group_id.to_string(),
    }))
}

fn reset_rotation(working: &mut AppData, rotation: GroupRotation) -> SyncResult<Applied> {
    working.group_rotation = rotation.clone();
    Ok(Applied::Broadcast(ServerMessage::RotationReset { rotation }))
}

fn save_bill(working: &mut AppData, month: String, bill: MonthlyBill) -> SyncResult<Applied> {
    let amounts = [bill.loyer, bill.electricite, bill.eau, bill.gaz, bill.imprevus];
    if amounts.iter().any(|a| !(*a >= 0.0) || !a.is_finite())
        || bill.autres.iter().any(|a| !(a.montant >= 0.0) || !a.montant.is_finite())
    {
        return Err(SyncError::Validation(
            "bill amounts must be finite and >= 0".to_string(),
        ));
    }
    if month.is_empty() {
        return Err(SyncError::Validation("month key is required".to_string()));
    }
    working.monthly_bills.insert(month.clone(), bill.clone());
    Ok(Applied::Broadcast(ServerMessage::BillSaved { month, bill }))
}

fn add_monthly_payment(
    working: &mut AppData,
    month: String,
    user_name: String,
    entry: LedgerEntry,
) -> SyncResult<Applied> {
    if !(entry.amount > 0.0) || !entry.amount.is_finite() {
        return Err(SyncError::Validation("payment amount must be > 0".to_string()));
    }
    if !working.has_user_named(&user_name) {
        return Err(SyncError::Validation(format!("unknown user '{}'", user_name)));
    }
    let Some(bill) = working.monthly_bills.get(&month) else {
        return Err(SyncError::Validation(format!("no bill recorded for {}", month)));
    };
    // Guards the division: an empty roster cannot split a bill.
    let share = per_person_share(bill, working.users.len())
        .map_err(|e| SyncError::Validation(e.to_string()))?;

    let ledger = working
        .monthly_payments
        .entry(month.clone())
        .or_default()
        .entry(user_name.clone())
        .or_insert_with(|| MonthlyLedger {
            paid: 0.0,
            remaining: share,
            payments: Vec::new(),
        });

    ledger.paid += entry.amount;
    ledger.remaining = remaining_share(ledger.paid, share);
    ledger.payments.push(entry);
    let ledger = ledger.clone();

    Ok(Applied::Broadcast(ServerMessage::MonthlyPaymentAdded {
        month,
        user_name,
        ledger,
    }))
}

fn update_settings(
    working: &mut AppData,
    weekly_amount: Option<f64>,
    site_title: Option<String>,
    admin_password: Option<String>,
) -> SyncResult<Applied> {
    if let Some(amount) = weekly_amount {
        if !(amount > 0.0) || !amount.is_finite() {
            return Err(SyncError::Validation(
                "weeklyAmount must be positive".to_string(),
            ));
        }
        working.weekly_amount = amount;
    }
    if let Some(title) = site_title {
        if title.trim().is_empty() {
            return Err(SyncError::Validation("site title must not be empty".to_string()));
        }
        working.site_title = title;
    }
    if let Some(password) = admin_password {
        if password.is_empty() {
            return Err(SyncError::Validation("password must not be empty".to_string()));
        }
        working.admin_password = password;
    }

    Ok(Applied::Broadcast(ServerMessage::SettingsUpdated {
        weekly_amount: working.weekly_amount,
        site_title: working.site_title.clone(),
        admin_password: working.admin_password.clone(),
    }))
}

/// Snapshots the current week into history. Idempotent per key: re-running
/// with unchanged records produces the same entry apart from `archived_at`.
async fn archive_week(
    store: &Arc<dyn StateStore>,
    doc: &mut AppData,
    events: &broadcast::Sender<Outbound>,
) -> SyncResult<Option<ArchiveReceipt>> {
    let week = week::week_key(Utc::now());
    doc.current_week = week.clone();

    let payments = doc.payments.get(&week).cloned().unwrap_or_default();
    if payments.is_empty() {
        warn!("No payments recorded for week {}, skipping archival", week);
        return Ok(None);
    }

    let archived_at = Utc::now();
    let mut working = doc.clone();
    working.history.insert(
        week.clone(),
        ArchivedWeek {
            payments,
            debts: doc.debts.get(&week).cloned().unwrap_or_default(),
            weekly_amount: doc.weekly_amount,
            users: doc.users.clone(),
            archived_at,
        },
    );

    if let Err(e) = store.save_app_data(&working).await {
        error!("Week {} not archived, save failed: {}", week, e);
        return Err(SyncError::Persistence(e.to_string()));
    }
    *doc = working;
    info!("Week {} archived", week);

    let _ = events.send(Outbound {
        skip: None,
        message: ServerMessage::WeeklyArchived {
            week: week.clone(),
            archived_at,
            message: format!("Semaine {} archivée", week),
        },
    });

    Ok(Some(ArchiveReceipt { week, archived_at }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foyer_core::ports::{BackupInfo, PortError, PortResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory store; can be switched to fail saves to exercise the
    /// persist-before-broadcast gate.
    #[derive(Default)]
    struct MemoryStore {
        fail_saves: AtomicBool,
        saved: tokio::sync::Mutex<Option<AppData>>,
    }

    #[async_trait::async_trait]
    impl StateStore for MemoryStore {
        async fn save_app_data(&self, data: &AppData) -> PortResult<()> {
            if self.fail_saves.load(Ordering::Relaxed) {
                return Err(PortError::Unexpected("write rejected".into()));
            }
            *self.saved.lock().await = Some(data.clone());
            Ok(())
        }
        async fn load_app_data(&self) -> PortResult<Option<AppData>> {
            Ok(self.saved.lock().await.clone())
        }
        async fn create_backup(&self, _data: &AppData) -> PortResult<String> {
            Ok("backup_test".to_string())
        }
        async fn get_backups(&self) -> PortResult<Vec<BackupInfo>> {
            Ok(Vec::new())
        }
    }

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    fn payment(id: &str, user_name: &str, amount: f64, week: &str) -> Payment {
        Payment {
            id: id.to_string(),
            user_name: user_name.to_string(),
            amount,
            date: Utc::now(),
            week: week.to_string(),
        }
    }

    fn start() -> (SyncHandle, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let handle = spawn(store.clone(), AppData::default());
        (handle, store)
    }

    #[tokio::test]
    async fn duplicate_user_add_is_idempotent_on_id() {
        let (handle, _store) = start();
        let ahmed = user("u1", "Ahmed");

        handle.add_user(ahmed.clone()).await.unwrap();
        handle.add_user(ahmed.clone()).await.unwrap();

        let doc = handle.snapshot().await.unwrap();
        assert_eq!(doc.users.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_with_new_id_is_rejected() {
        let (handle, _store) = start();
        handle.add_user(user("u1", "Ahmed")).await.unwrap();

        let err = handle.add_user(user("u2", "Ahmed")).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(handle.snapshot().await.unwrap().users.len(), 1);
    }

    #[tokio::test]
    async fn new_payment_replaces_prior_one_for_the_same_week() {
        let (handle, _store) = start();
        handle.add_user(user("u1", "Ahmed")).await.unwrap();

        handle
            .add_payment(payment("p1", "Ahmed", 80.0, "2026-08-24"))
            .await
            .unwrap();
        handle
            .add_payment(payment("p2", "Ahmed", 120.0, "2026-08-24"))
            .await
            .unwrap();

        let doc = handle.snapshot().await.unwrap();
        let week = doc.payments.get("2026-08-24").unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(doc.payment_for("2026-08-24", "Ahmed").unwrap().amount, 120.0);
    }

    #[tokio::test]
    async fn payment_for_unknown_user_is_rejected() {
        let (handle, _store) = start();
        let err = handle
            .add_payment(payment("p1", "Nobody", 50.0, "2026-08-24"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn update_of_unknown_user_reports_not_found() {
        let (handle, _store) = start();
        let err = handle.update_user(user("ghost", "Ghost")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_a_user_prunes_payments_but_keeps_debts() {
        let (handle, _store) = start();
        handle.add_user(user("u1", "Ahmed")).await.unwrap();
        let week = week::week_key(Utc::now());
        handle
            .add_payment(payment("p1", "Ahmed", 100.0, &week))
            .await
            .unwrap();
        handle
            .add_debt(
                Debt {
                    id: "d1".into(),
                    amount: 30.0,
                    description: "Gaz".into(),
                    date: Utc::now(),
                    week: week.clone(),
                },
                "Ahmed".to_string(),
            )
            .await
            .unwrap();

        handle.delete_user("u1".to_string()).await.unwrap();

        let doc = handle.snapshot().await.unwrap();
        assert!(doc.users.is_empty());
        assert!(doc.payment_for(&week, "Ahmed").is_none());
        assert_eq!(doc.debts_for(&week, "Ahmed").len(), 1);
    }

    #[tokio::test]
    async fn failed_save_leaves_state_untouched_and_reports() {
        let (handle, store) = start();
        store.fail_saves.store(true, Ordering::Relaxed);

        let mut events = handle.subscribe();
        let err = handle.add_user(user("u1", "Ahmed")).await.unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));

        let doc = handle.snapshot().await.unwrap();
        assert!(doc.users.is_empty());
        // Nothing was broadcast for the rejected mutation.
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn archive_is_idempotent_and_skips_empty_weeks() {
        let (handle, _store) = start();

        // Nothing recorded yet: archival is a logged no-op.
        assert!(handle.archive_week().await.unwrap().is_none());

        handle.add_user(user("u1", "Ahmed")).await.unwrap();
        let week = week::week_key(Utc::now());
        handle
            .add_payment(payment("p1", "Ahmed", 100.0, &week))
            .await
            .unwrap();

        let first = handle.archive_week().await.unwrap().unwrap();
        assert_eq!(first.week, week);
        let snapshot_one = handle.snapshot().await.unwrap().history[&week].clone();

        let second = handle.archive_week().await.unwrap().unwrap();
        assert_eq!(second.week, week);
        let snapshot_two = handle.snapshot().await.unwrap().history[&week].clone();

        // Same key, same content apart from the archival instant.
        assert_eq!(snapshot_one.payments, snapshot_two.payments);
        assert_eq!(snapshot_one.debts, snapshot_two.debts);
        assert_eq!(snapshot_one.weekly_amount, snapshot_two.weekly_amount);
        assert_eq!(snapshot_one.users, snapshot_two.users);
        assert_eq!(handle.snapshot().await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn monthly_payment_requires_a_bill_and_accumulates() {
        let (handle, _store) = start();
        for (id, name) in [("u1", "Ahmed"), ("u2", "Fatima"), ("u3", "Youssef"), ("u4", "Aicha")] {
            handle.add_user(user(id, name)).await.unwrap();
        }

        let entry = |amount: f64| LedgerEntry {
            amount,
            date: Utc::now(),
            note: String::new(),
        };

        // No bill yet for the month.
        let err = handle
            .add_monthly_payment("2026-08".into(), "Ahmed".into(), entry(600.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        handle
            .save_bill(
                "2026-08".into(),
                MonthlyBill {
                    loyer: 4500.0,
                    electricite: 300.0,
                    eau: 100.0,
                    gaz: 50.0,
                    imprevus: 0.0,
                    autres: vec![],
                },
            )
            .await
            .unwrap();

        handle
            .add_monthly_payment("2026-08".into(), "Ahmed".into(), entry(600.0))
            .await
            .unwrap();
        handle
            .add_monthly_payment("2026-08".into(), "Ahmed".into(), entry(637.5))
            .await
            .unwrap();

        let doc = handle.snapshot().await.unwrap();
        let ledger = &doc.monthly_payments["2026-08"]["Ahmed"];
        assert_eq!(ledger.paid, 1237.5);
        assert_eq!(ledger.remaining, 0.0);
        assert_eq!(ledger.payments.len(), 2);
    }

    #[tokio::test]
    async fn replace_all_recomputes_the_current_week() {
        let (handle, _store) = start();
        let mut incoming = AppData::default();
        incoming.current_week = "1999-01-04".to_string();

        handle.replace_all(incoming, None).await.unwrap();

        let doc = handle.snapshot().await.unwrap();
        assert_eq!(doc.current_week, week::week_key(Utc::now()));
    }

    #[tokio::test]
    async fn broadcasts_skip_the_origin_only_for_wholesale_replace() {
        let (handle, _store) = start();
        let origin = Uuid::new_v4();
        let mut events = handle.subscribe();

        handle.replace_all(AppData::default(), Some(origin)).await.unwrap();
        let outbound = events.recv().await.unwrap();
        assert_eq!(outbound.skip, Some(origin));
        assert!(matches!(outbound.message, ServerMessage::DataUpdated { .. }));

        handle.add_user(user("u1", "Ahmed")).await.unwrap();
        let outbound = events.recv().await.unwrap();
        assert_eq!(outbound.skip, None);
        assert!(matches!(outbound.message, ServerMessage::UserAdded { .. }));
    }
}
