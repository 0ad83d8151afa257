use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::limits::*;
use crate::model::*;
use crate::snapshot;

/// The Entity Store: four typed tables, each a keyed collection plus a
/// last-assigned-id counter, persisted write-through as one durable record
/// per kind. Every successful mutation result reflects durable state; a
/// failed flush rolls the in-memory change back before returning.
///
/// Constructed once at process start and passed in wherever it is needed —
/// never a process-wide global.
pub struct EntityStore {
    users: RwLock<UserTable>,
    tutor_profiles: RwLock<ProfileTable<TutorProfile>>,
    student_profiles: RwLock<ProfileTable<StudentProfile>>,
    bookings: RwLock<BookingTable>,
    persist_tx: mpsc::Sender<PersistCommand>,
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    DuplicateEmail(String),
    LimitExceeded(&'static str),
    /// Durable write failed; the in-memory mutation was rolled back.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::DuplicateEmail(email) => write!(f, "email already registered: {email}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Unavailable(e) => write!(f, "durable write failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ── Persisted record layout ──────────────────────────────────────

/// The on-disk record for one entity kind.
#[derive(Serialize, Deserialize)]
struct TableRecord<T> {
    last_id: u64,
    rows: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SnapshotKind {
    Users,
    TutorProfiles,
    StudentProfiles,
    Bookings,
}

impl SnapshotKind {
    fn file_name(self) -> &'static str {
        match self {
            SnapshotKind::Users => "users.db",
            SnapshotKind::TutorProfiles => "tutor_profiles.db",
            SnapshotKind::StudentProfiles => "student_profiles.db",
            SnapshotKind::Bookings => "bookings.db",
        }
    }
}

// ── Group-commit snapshot writer ─────────────────────────────────

struct PersistCommand {
    kind: SnapshotKind,
    payload: Vec<u8>,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the data directory and batches flushes.
/// 1. Block until the first command arrives.
/// 2. Drain all immediately available commands (the batch window).
/// 3. Per kind, keep only the newest payload — a later snapshot of the same
///    table supersedes an earlier one, so the flush that lands it also
///    covers every earlier waiter.
/// 4. One atomic rewrite per dirty kind, then respond to all senders.
async fn snapshot_writer_loop(data_dir: PathBuf, mut rx: mpsc::Receiver<PersistCommand>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(cmd) = rx.try_recv() {
            batch.push(cmd);
        }

        metrics::histogram!(crate::observability::SNAPSHOT_FLUSH_BATCH_SIZE)
            .record(batch.len() as f64);
        let flush_start = std::time::Instant::now();

        let mut newest: HashMap<SnapshotKind, &[u8]> = HashMap::new();
        for cmd in &batch {
            newest.insert(cmd.kind, &cmd.payload);
        }

        let mut results: HashMap<SnapshotKind, io::Result<()>> = HashMap::new();
        for (kind, payload) in newest {
            let path = data_dir.join(kind.file_name());
            results.insert(kind, snapshot::write_atomic_raw(&path, payload));
        }

        metrics::histogram!(crate::observability::SNAPSHOT_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for cmd in batch {
            let result = match results.get(&cmd.kind) {
                Some(Ok(())) => Ok(()),
                Some(Err(e)) => Err(io::Error::new(e.kind(), e.to_string())),
                None => Ok(()),
            };
            let _ = cmd.response.send(result);
        }
    }
}

// ── In-memory tables ─────────────────────────────────────────────

struct UserTable {
    last_id: u64,
    rows: HashMap<u64, User>,
    /// Unique-email index, rebuilt at load, not persisted.
    by_email: HashMap<String, u64>,
}

struct ProfileTable<T> {
    rows: HashMap<u64, T>,
}

struct BookingTable {
    last_id: u64,
    rows: HashMap<u64, Booking>,
    /// Secondary indexes, rebuilt at load, not persisted.
    by_tutor: HashMap<u64, Vec<u64>>,
    by_student: HashMap<u64, Vec<u64>>,
}

fn load_record<T: DeserializeOwned>(data_dir: &Path, kind: SnapshotKind) -> io::Result<TableRecord<T>> {
    Ok(snapshot::load(&data_dir.join(kind.file_name()))?.unwrap_or(TableRecord {
        last_id: 0,
        rows: Vec::new(),
    }))
}

impl EntityStore {
    /// Load all entity kinds from `data_dir` (created if absent) and spawn
    /// the snapshot writer. Must run inside a tokio runtime.
    pub fn open(data_dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let user_rec: TableRecord<User> = load_record(data_dir, SnapshotKind::Users)?;
        let mut users = UserTable {
            last_id: user_rec.last_id,
            rows: HashMap::new(),
            by_email: HashMap::new(),
        };
        for user in user_rec.rows {
            users.by_email.insert(user.email.clone(), user.id.0);
            users.rows.insert(user.id.0, user);
        }

        let tutor_rec: TableRecord<TutorProfile> =
            load_record(data_dir, SnapshotKind::TutorProfiles)?;
        let tutor_profiles = ProfileTable {
            rows: tutor_rec.rows.into_iter().map(|p| (p.user_id.0, p)).collect(),
        };

        let student_rec: TableRecord<StudentProfile> =
            load_record(data_dir, SnapshotKind::StudentProfiles)?;
        let student_profiles = ProfileTable {
            rows: student_rec.rows.into_iter().map(|p| (p.user_id.0, p)).collect(),
        };

        let booking_rec: TableRecord<Booking> = load_record(data_dir, SnapshotKind::Bookings)?;
        let mut bookings = BookingTable {
            last_id: booking_rec.last_id,
            rows: HashMap::new(),
            by_tutor: HashMap::new(),
            by_student: HashMap::new(),
        };
        for booking in booking_rec.rows {
            bookings.by_tutor.entry(booking.tutor_id.0).or_default().push(booking.id.0);
            bookings.by_student.entry(booking.student_id.0).or_default().push(booking.id.0);
            bookings.rows.insert(booking.id.0, booking);
        }

        let (persist_tx, persist_rx) = mpsc::channel(4096);
        tokio::spawn(snapshot_writer_loop(data_dir.to_path_buf(), persist_rx));

        Ok(Self {
            users: RwLock::new(users),
            tutor_profiles: RwLock::new(tutor_profiles),
            student_profiles: RwLock::new(student_profiles),
            bookings: RwLock::new(bookings),
            persist_tx,
        })
    }

    /// Hand a serialized record to the snapshot writer and wait for the
    /// flush that covers it. Called with the table's write lock held, so a
    /// rollback on failure cannot interleave with another mutation of the
    /// same kind.
    async fn persist(&self, kind: SnapshotKind, payload: Vec<u8>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.persist_tx
            .send(PersistCommand { kind, payload, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("snapshot writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("snapshot writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    // ── Users ────────────────────────────────────────────────────

    pub async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut table = self.users.write().await;
        if table.rows.len() >= MAX_USERS {
            return Err(StoreError::LimitExceeded("too many users"));
        }
        if table.by_email.contains_key(&new.email) {
            return Err(StoreError::DuplicateEmail(new.email));
        }

        let id = table.last_id + 1;
        let user = User {
            id: UserId(id),
            display_name: new.display_name,
            email: new.email,
            role: new.role,
            status: new.status,
            timezone: new.timezone,
            created_at: now_ms(),
        };
        table.last_id = id;
        table.by_email.insert(user.email.clone(), id);
        table.rows.insert(id, user.clone());

        let payload = encode_users(&table);
        if let Err(e) = self.persist(SnapshotKind::Users, payload).await {
            table.rows.remove(&id);
            table.by_email.remove(&user.email);
            table.last_id -= 1;
            return Err(e);
        }
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Option<User> {
        self.users.read().await.rows.get(&id.0).cloned()
    }

    pub async fn find_users(&self, predicate: impl Fn(&User) -> bool) -> Vec<User> {
        let table = self.users.read().await;
        let mut out: Vec<User> = table.rows.values().filter(|u| predicate(u)).cloned().collect();
        out.sort_by_key(|u| u.id);
        out
    }

    // ── Tutor profiles ───────────────────────────────────────────

    /// Create or replace the tutor's profile. `updated_at` is stamped here;
    /// `created_at` survives a replace.
    pub async fn put_tutor_profile(
        &self,
        mut profile: TutorProfile,
    ) -> Result<TutorProfile, StoreError> {
        let mut table = self.tutor_profiles.write().await;
        let key = profile.user_id.0;
        let now = now_ms();
        profile.updated_at = now;
        if let Some(existing) = table.rows.get(&key) {
            profile.created_at = existing.created_at;
        } else {
            profile.created_at = now;
        }
        let previous = table.rows.insert(key, profile.clone());

        let payload = encode_profiles(&table);
        if let Err(e) = self.persist(SnapshotKind::TutorProfiles, payload).await {
            match previous {
                Some(prev) => {
                    table.rows.insert(key, prev);
                }
                None => {
                    table.rows.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(profile)
    }

    pub async fn get_tutor_profile(&self, user_id: UserId) -> Option<TutorProfile> {
        self.tutor_profiles.read().await.rows.get(&user_id.0).cloned()
    }

    // ── Student profiles ─────────────────────────────────────────

    pub async fn put_student_profile(
        &self,
        mut profile: StudentProfile,
    ) -> Result<StudentProfile, StoreError> {
        let mut table = self.student_profiles.write().await;
        let key = profile.user_id.0;
        let now = now_ms();
        profile.updated_at = now;
        if let Some(existing) = table.rows.get(&key) {
            profile.created_at = existing.created_at;
        } else {
            profile.created_at = now;
        }
        let previous = table.rows.insert(key, profile.clone());

        let payload = encode_profiles(&table);
        if let Err(e) = self.persist(SnapshotKind::StudentProfiles, payload).await {
            match previous {
                Some(prev) => {
                    table.rows.insert(key, prev);
                }
                None => {
                    table.rows.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(profile)
    }

    pub async fn get_student_profile(&self, user_id: UserId) -> Option<StudentProfile> {
        self.student_profiles.read().await.rows.get(&user_id.0).cloned()
    }

    // ── Bookings ─────────────────────────────────────────────────

    /// Persist a new booking in its initial PENDING state. The Lifecycle
    /// Manager is the only caller; no other component writes bookings.
    pub async fn create_booking(&self, new: NewBooking) -> Result<Booking, StoreError> {
        let mut table = self.bookings.write().await;
        if table.rows.len() >= MAX_BOOKINGS {
            return Err(StoreError::LimitExceeded("too many bookings"));
        }

        let id = table.last_id + 1;
        let now = now_ms();
        let booking = Booking {
            id: BookingId(id),
            student_id: new.student_id,
            tutor_id: new.tutor_id,
            subject_id: new.subject_id,
            start: new.start,
            end: new.end,
            status: BookingStatus::Pending,
            price_cents: new.price_cents,
            currency: new.currency,
            status_reason: None,
            created_at: now,
            updated_at: now,
        };
        table.last_id = id;
        table.by_tutor.entry(booking.tutor_id.0).or_default().push(id);
        table.by_student.entry(booking.student_id.0).or_default().push(id);
        table.rows.insert(id, booking.clone());

        let payload = encode_bookings(&table);
        if let Err(e) = self.persist(SnapshotKind::Bookings, payload).await {
            table.rows.remove(&id);
            if let Some(ids) = table.by_tutor.get_mut(&booking.tutor_id.0) {
                ids.retain(|b| *b != id);
            }
            if let Some(ids) = table.by_student.get_mut(&booking.student_id.0) {
                ids.retain(|b| *b != id);
            }
            table.last_id -= 1;
            return Err(e);
        }
        Ok(booking)
    }

    pub async fn get_booking(&self, id: BookingId) -> Option<Booking> {
        self.bookings.read().await.rows.get(&id.0).cloned()
    }

    pub async fn bookings_for_tutor(&self, tutor_id: UserId) -> Vec<Booking> {
        let table = self.bookings.read().await;
        let mut out: Vec<Booking> = table
            .by_tutor
            .get(&tutor_id.0)
            .into_iter()
            .flatten()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect();
        out.sort_by_key(|b| b.start);
        out
    }

    pub async fn bookings_for_student(&self, student_id: UserId) -> Vec<Booking> {
        let table = self.bookings.read().await;
        let mut out: Vec<Booking> = table
            .by_student
            .get(&student_id.0)
            .into_iter()
            .flatten()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect();
        out.sort_by_key(|b| b.start);
        out
    }

    pub async fn find_bookings(&self, predicate: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let table = self.bookings.read().await;
        let mut out: Vec<Booking> =
            table.rows.values().filter(|b| predicate(b)).cloned().collect();
        out.sort_by_key(|b| b.id);
        out
    }

    /// Patch a booking's status fields and stamp `updated_at`. Bookings are
    /// never removed; terminal statuses keep the auditable history intact.
    pub async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        status_reason: Option<String>,
    ) -> Result<Booking, StoreError> {
        let mut table = self.bookings.write().await;
        let previous = match table.rows.get(&id.0) {
            Some(b) => b.clone(),
            None => return Err(StoreError::NotFound(id.to_string())),
        };

        let updated = {
            let row = table.rows.get_mut(&id.0).expect("row present: just fetched");
            row.status = status;
            row.status_reason = status_reason;
            row.updated_at = now_ms();
            row.clone()
        };

        let payload = encode_bookings(&table);
        if let Err(e) = self.persist(SnapshotKind::Bookings, payload).await {
            table.rows.insert(id.0, previous);
            return Err(e);
        }
        Ok(updated)
    }
}

/// Record to create a User; the store allocates the id and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub timezone: String,
}

/// Record to create a Booking; the store allocates the id, stamps the
/// timestamps, and sets the initial PENDING status.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub student_id: UserId,
    pub tutor_id: UserId,
    pub subject_id: String,
    pub start: Ms,
    pub end: Ms,
    pub price_cents: i64,
    pub currency: String,
}

// Serialization happens under the table lock so the snapshot is a
// consistent image of the table; bincode of these records cannot fail.

fn encode_users(table: &UserTable) -> Vec<u8> {
    let mut rows: Vec<&User> = table.rows.values().collect();
    rows.sort_by_key(|u| u.id);
    bincode::serialize(&TableRecord { last_id: table.last_id, rows })
        .expect("user table serializes")
}

fn encode_profiles<T: Serialize>(table: &ProfileTable<T>) -> Vec<u8> {
    let rows: Vec<&T> = table.rows.values().collect();
    bincode::serialize(&TableRecord { last_id: 0, rows }).expect("profile table serializes")
}

fn encode_bookings(table: &BookingTable) -> Vec<u8> {
    let mut rows: Vec<&Booking> = table.rows.values().collect();
    rows.sort_by_key(|b| b.id);
    bincode::serialize(&TableRecord { last_id: table.last_id, rows })
        .expect("booking table serializes")
}
