//! In-memory inventory store with an optional JSON snapshot file.
//!
//! Rows live in ordered maps behind a single `RwLock`. Commits apply each
//! write while recording an undo entry; if any write fails, or the snapshot
//! cannot be written afterwards, the undo log is replayed backwards and the
//! tables are left exactly as they were.
//!
//! The snapshot is written under an upgradable read guard: readers are not
//! held up by file I/O, and other commits wait until the write has landed
//! or been rolled back. A listing taken during a failing write can observe
//! rows that are then rolled back.

use super::{InventoryStore, Write, WriteBatch};
use crate::error::StoreError;
use crate::model::{Customer, CustomerId, Reservation, ReservationId, Trip, TripId, User, UserId};
use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

/// On-disk representation of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Trip rows
    #[serde(default)]
    pub trips: Vec<Trip>,
    /// Customer rows
    #[serde(default)]
    pub customers: Vec<Customer>,
    /// Reservation rows
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    /// User rows
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Default)]
struct Tables {
    trips: BTreeMap<TripId, Trip>,
    customers: BTreeMap<CustomerId, Customer>,
    reservations: BTreeMap<ReservationId, Reservation>,
    users: BTreeMap<UserId, User>,
}

/// Prior state of one row, restored on rollback.
enum Undo {
    Trip(TripId, Option<Trip>),
    Customer(CustomerId, Option<Customer>),
    Reservation(ReservationId, Option<Reservation>),
    User(UserId, Option<User>),
}

fn insert_row<T>(
    table: &mut BTreeMap<u32, T>,
    entity: &'static str,
    id: u32,
    row: T,
) -> Result<(), StoreError> {
    if table.contains_key(&id) {
        return Err(StoreError::DuplicateId { entity, id });
    }
    table.insert(id, row);
    Ok(())
}

fn update_row<T>(
    table: &mut BTreeMap<u32, T>,
    entity: &'static str,
    id: u32,
    row: T,
) -> Result<T, StoreError> {
    table
        .get_mut(&id)
        .map(|slot| std::mem::replace(slot, row))
        .ok_or(StoreError::MissingId { entity, id })
}

fn delete_row<T>(table: &mut BTreeMap<u32, T>, entity: &'static str, id: u32) -> Result<T, StoreError> {
    table.remove(&id).ok_or(StoreError::MissingId { entity, id })
}

fn restore_row<T>(table: &mut BTreeMap<u32, T>, id: u32, prior: Option<T>) {
    match prior {
        Some(row) => {
            table.insert(id, row);
        }
        None => {
            table.remove(&id);
        }
    }
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        let mut tables = Self::default();
        for trip in snapshot.trips {
            insert_row(&mut tables.trips, "Trip", trip.id, trip)?;
        }
        for customer in snapshot.customers {
            insert_row(&mut tables.customers, "Customer", customer.id, customer)?;
        }
        for reservation in snapshot.reservations {
            insert_row(
                &mut tables.reservations,
                "Reservation",
                reservation.id,
                reservation,
            )?;
        }
        for user in snapshot.users {
            insert_row(&mut tables.users, "User", user.id, user)?;
        }
        Ok(tables)
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            trips: self.trips.values().cloned().collect(),
            customers: self.customers.values().cloned().collect(),
            reservations: self.reservations.values().cloned().collect(),
            users: self.users.values().cloned().collect(),
        }
    }

    fn apply(&mut self, write: Write) -> Result<Undo, StoreError> {
        let undo = match write {
            Write::InsertTrip(trip) => {
                let id = trip.id;
                insert_row(&mut self.trips, "Trip", id, trip)?;
                Undo::Trip(id, None)
            }
            Write::UpdateTrip(trip) => {
                let id = trip.id;
                let prior = update_row(&mut self.trips, "Trip", id, trip)?;
                Undo::Trip(id, Some(prior))
            }
            Write::DeleteTrip(id) => {
                let prior = delete_row(&mut self.trips, "Trip", id)?;
                Undo::Trip(id, Some(prior))
            }
            Write::InsertCustomer(customer) => {
                let id = customer.id;
                insert_row(&mut self.customers, "Customer", id, customer)?;
                Undo::Customer(id, None)
            }
            Write::InsertReservation(reservation) => {
                let id = reservation.id;
                insert_row(&mut self.reservations, "Reservation", id, reservation)?;
                Undo::Reservation(id, None)
            }
            Write::DeleteReservation(id) => {
                let prior = delete_row(&mut self.reservations, "Reservation", id)?;
                Undo::Reservation(id, Some(prior))
            }
            Write::InsertUser(user) => {
                let id = user.id;
                insert_row(&mut self.users, "User", id, user)?;
                Undo::User(id, None)
            }
            Write::UpdateUser(user) => {
                let id = user.id;
                let prior = update_row(&mut self.users, "User", id, user)?;
                Undo::User(id, Some(prior))
            }
            Write::DeleteUser(id) => {
                let prior = delete_row(&mut self.users, "User", id)?;
                Undo::User(id, Some(prior))
            }
        };
        Ok(undo)
    }

    fn rollback(&mut self, undo_log: Vec<Undo>) {
        for undo in undo_log.into_iter().rev() {
            match undo {
                Undo::Trip(id, prior) => restore_row(&mut self.trips, id, prior),
                Undo::Customer(id, prior) => restore_row(&mut self.customers, id, prior),
                Undo::Reservation(id, prior) => restore_row(&mut self.reservations, id, prior),
                Undo::User(id, prior) => restore_row(&mut self.users, id, prior),
            }
        }
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty, purely in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `snapshot`, without a backing file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateId` if the snapshot repeats an id.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        Ok(Self {
            tables: RwLock::new(Tables::from_snapshot(snapshot)?),
            snapshot_path: None,
        })
    }

    /// Open a store backed by a JSON snapshot file.
    ///
    /// A missing file starts an empty store; the file is created on the
    /// first successful commit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file exists but cannot be read or parsed,
    /// or if it repeats an id.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let snapshot = if path.exists() {
            let file = File::open(path).map_err(|source| StoreError::LoadFailed {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            tracing::info!("Snapshot {} not found, starting empty", path.display());
            Snapshot::default()
        };

        Ok(Self {
            tables: RwLock::new(Tables::from_snapshot(snapshot)?),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let persist_failed = |source| StoreError::PersistFailed {
            path: path.clone(),
            source,
        };

        let tmp_path = path.with_extension("tmp");
        let file = File::create(&tmp_path).map_err(persist_failed)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &tables.to_snapshot())?;
        writer.flush().map_err(persist_failed)?;
        drop(writer);
        fs::rename(&tmp_path, path).map_err(persist_failed)
    }
}

impl InventoryStore for MemoryStore {
    fn trip(&self, id: TripId) -> Result<Option<Trip>, StoreError> {
        Ok(self.tables.read().trips.get(&id).cloned())
    }

    fn trips(&self) -> Result<Vec<Trip>, StoreError> {
        Ok(self.tables.read().trips.values().cloned().collect())
    }

    fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.tables.read().customers.values().cloned().collect())
    }

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.tables.read().reservations.get(&id).cloned())
    }

    fn reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.tables.read().reservations.values().cloned().collect())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    fn users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.read().users.values().cloned().collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let mut undo_log = Vec::with_capacity(batch.len());

        for write in batch {
            match tables.apply(write) {
                Ok(undo) => undo_log.push(undo),
                Err(e) => {
                    tables.rollback(undo_log);
                    return Err(e);
                }
            }
        }

        // Readers proceed while the snapshot is written; writers stay out
        // until it is on disk or rolled back.
        let tables = RwLockWriteGuard::downgrade_to_upgradable(tables);
        if let Err(e) = self.persist(&tables) {
            tracing::error!("Snapshot write failed, rolling back commit: {e}");
            let mut tables = RwLockUpgradableReadGuard::upgrade(tables);
            tables.rollback(undo_log);
            return Err(e);
        }

        Ok(())
    }

    fn customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .tables
            .read()
            .customers
            .values()
            .find(|customer| customer.name == name)
            .cloned())
    }

    fn reservations_for_trip(&self, trip_id: TripId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .tables
            .read()
            .reservations
            .values()
            .filter(|reservation| reservation.trip_id == trip_id)
            .cloned()
            .collect())
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }
}
