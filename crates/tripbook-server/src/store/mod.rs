//! Persistence contract for trips, customers, reservations and users.
//!
//! The inventory service only talks to storage through [`InventoryStore`].
//! Reads are point lookups, full listings and a few entity-specific queries;
//! every mutation goes through [`InventoryStore::commit`], which applies a
//! [`WriteBatch`] all-or-nothing. A reservation therefore lands together with
//! its seat decrement (and the customer row it may create) or not at all.

use crate::error::StoreError;
use crate::model::{Customer, Reservation, ReservationId, Trip, TripId, User, UserId};

pub mod memory;

pub use memory::MemoryStore;

/// A single staged mutation.
///
/// Inserts fail when the id is taken, updates and deletes fail when it is not.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Insert a new trip
    InsertTrip(Trip),
    /// Replace an existing trip
    UpdateTrip(Trip),
    /// Remove a trip
    DeleteTrip(TripId),
    /// Insert a new customer
    InsertCustomer(Customer),
    /// Insert a new reservation
    InsertReservation(Reservation),
    /// Remove a reservation
    DeleteReservation(ReservationId),
    /// Insert a new user
    InsertUser(User),
    /// Replace an existing user
    UpdateUser(User),
    /// Remove a user
    DeleteUser(UserId),
}

/// Ordered list of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { writes: Vec::new() }
    }

    /// Stage a write at the end of the batch.
    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    /// Number of staged writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl FromIterator<Write> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = Write>>(iter: I) -> Self {
        Self {
            writes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for WriteBatch {
    type Item = Write;
    type IntoIter = std::vec::IntoIter<Write>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

/// Storage backend consumed by the inventory service.
///
/// Calls are synchronous. Listings are ordered by ascending id so repeated
/// reads without intervening writes return identical sequences.
pub trait InventoryStore: Send + Sync + std::fmt::Debug {
    /// Look up a trip by id.
    fn trip(&self, id: TripId) -> Result<Option<Trip>, StoreError>;

    /// All trips.
    fn trips(&self) -> Result<Vec<Trip>, StoreError>;

    /// All customers.
    fn customers(&self) -> Result<Vec<Customer>, StoreError>;

    /// Look up a reservation by id.
    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// All reservations.
    fn reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    /// Look up a user by id.
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// All users.
    fn users(&self) -> Result<Vec<User>, StoreError>;

    /// Apply every write of `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Trips whose attraction name contains `partial`.
    fn trips_by_attraction(&self, partial: &str) -> Result<Vec<Trip>, StoreError> {
        Ok(self
            .trips()?
            .into_iter()
            .filter(|trip| trip.attraction_contains(partial))
            .collect())
    }

    /// Trips matching `partial` that depart within `[start, end]`.
    fn trips_by_attraction_and_time(
        &self,
        partial: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Trip>, StoreError> {
        Ok(self
            .trips()?
            .into_iter()
            .filter(|trip| trip.attraction_contains(partial) && trip.departs_between(start, end))
            .collect())
    }

    /// Customer with exactly this name.
    fn customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .customers()?
            .into_iter()
            .find(|customer| customer.name == name))
    }

    /// Reservations booked on one trip.
    fn reservations_for_trip(&self, trip_id: TripId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .reservations()?
            .into_iter()
            .filter(|reservation| reservation.trip_id == trip_id)
            .collect())
    }

    /// User with exactly this username.
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users()?.into_iter().find(|user| user.username == username))
    }
}
