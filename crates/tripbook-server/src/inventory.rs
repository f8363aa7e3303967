//! Inventory operations shared by every connection.
//!
//! All mutation of trips, customers, reservations and users goes through
//! [`Inventory`]. Read-check-write sequences on a trip run under that trip's
//! lock, so two connections booking the same trip cannot both observe the
//! same seat count. Lock order is: trip locks in ascending id order, then the
//! customer-name lock. User mutations share a single lock because username
//! uniqueness spans the whole table.

use crate::error::{InventoryError, StoreError};
use crate::model::{Customer, CustomerId, Reservation, ReservationId, Trip, TripId, User, UserId};
use crate::store::{InventoryStore, Write, WriteBatch};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic id source owned by the server process.
#[derive(Debug)]
pub struct IdSequence {
    last: AtomicU32,
}

impl IdSequence {
    /// Sequence whose first id is `max + 1`.
    #[must_use]
    pub const fn starting_after(max: u32) -> Self {
        Self {
            last: AtomicU32::new(max),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u32 {
        self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

/// Mutex per key, present only while some caller holds or waits on it.
#[derive(Debug)]
struct LockTable<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Run `f` holding the mutex for `key`.
    ///
    /// The map shard is released before locking. Afterwards the entry is
    /// dropped unless another caller has cloned it in the meantime.
    fn with_lock<R>(&self, key: K, f: impl FnOnce() -> R) -> R {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = mutex.lock();
            f()
        };
        drop(mutex);
        self.locks
            .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        result
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Parameters of a `MAKE_RESERVATION` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Name the customer is looked up (or created) under
    pub customer_name: String,
    /// Phone stored on a newly created customer
    pub phone: String,
    /// Trip to book
    pub trip_id: TripId,
    /// Seats to take
    pub tickets: u32,
}

/// Business operations over an [`InventoryStore`].
#[derive(Debug)]
pub struct Inventory {
    store: Arc<dyn InventoryStore>,
    trip_locks: LockTable<TripId>,
    customer_locks: LockTable<String>,
    user_lock: Mutex<()>,
    customer_ids: IdSequence,
    reservation_ids: IdSequence,
}

impl Inventory {
    /// Wrap a store, seeding id sequences from the highest ids it holds.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store cannot be listed.
    pub fn new(store: Arc<dyn InventoryStore>) -> Result<Self, StoreError> {
        let max_customer = store.customers()?.iter().map(|c| c.id).max().unwrap_or(0);
        let max_reservation = store
            .reservations()?
            .iter()
            .map(|r| r.id)
            .max()
            .unwrap_or(0);

        Ok(Self {
            store,
            trip_locks: LockTable::new(),
            customer_locks: LockTable::new(),
            user_lock: Mutex::new(()),
            customer_ids: IdSequence::starting_after(max_customer),
            reservation_ids: IdSequence::starting_after(max_reservation),
        })
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Compare credentials against the stored user.
    pub fn check_login(&self, username: &str, password: &str) -> Result<bool, InventoryError> {
        let valid = self
            .store
            .user_by_username(username)?
            .is_some_and(|user| user.password == password);

        if valid {
            tracing::info!("Login succeeded for {username}");
        } else {
            tracing::info!("Login failed for {username}");
        }
        Ok(valid)
    }

    /// All trips, ordered by id.
    pub fn trips(&self) -> Result<Vec<Trip>, InventoryError> {
        Ok(self.store.trips()?)
    }

    /// All users, ordered by id.
    pub fn users(&self) -> Result<Vec<User>, InventoryError> {
        Ok(self.store.users()?)
    }

    /// Search trips.
    ///
    /// With both bounds set, filters by attraction substring and departure
    /// range; with only an attraction, by substring; otherwise returns all.
    pub fn search_trips(
        &self,
        attraction: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Trip>, InventoryError> {
        let trips = if !start.is_empty() && !end.is_empty() {
            self.store
                .trips_by_attraction_and_time(attraction, start, end)?
        } else if !attraction.is_empty() {
            self.store.trips_by_attraction(attraction)?
        } else {
            self.store.trips()?
        };

        tracing::debug!(
            "Search '{attraction}' [{start}, {end}] matched {} trips",
            trips.len()
        );
        Ok(trips)
    }

    /// Reservations on one trip, or all of them.
    pub fn reservations(&self, trip_id: Option<TripId>) -> Result<Vec<Reservation>, InventoryError> {
        Ok(match trip_id {
            Some(id) => self.store.reservations_for_trip(id)?,
            None => self.store.reservations()?,
        })
    }

    /// Book seats on a trip.
    ///
    /// The seat check, customer creation, reservation insert and seat
    /// decrement happen under the trip lock and commit as one batch.
    pub fn reserve(&self, request: &ReservationRequest) -> Result<Reservation, InventoryError> {
        if request.tickets == 0 {
            return Err(InventoryError::NoTickets);
        }

        self.trip_locks
            .with_lock(request.trip_id, || self.reserve_locked(request))
    }

    fn reserve_locked(&self, request: &ReservationRequest) -> Result<Reservation, InventoryError> {
        let trip = self
            .store
            .trip(request.trip_id)?
            .ok_or(InventoryError::TripNotFound(request.trip_id))?;

        if trip.available_seats < request.tickets {
            return Err(InventoryError::InsufficientSeats {
                requested: request.tickets,
                available: trip.available_seats,
            });
        }

        let (reservation, trip) = self
            .customer_locks
            .with_lock(request.customer_name.clone(), || {
                self.commit_reservation(request, trip)
            })?;

        tracing::info!(
            "Reservation {} booked {} seats on trip {} for customer {}, {} left",
            reservation.id,
            reservation.tickets,
            trip.id,
            reservation.customer_id,
            trip.available_seats
        );
        Ok(reservation)
    }

    fn commit_reservation(
        &self,
        request: &ReservationRequest,
        mut trip: Trip,
    ) -> Result<(Reservation, Trip), InventoryError> {
        let mut batch = WriteBatch::new();
        let customer_id = self.find_or_stage_customer(request, &mut batch)?;

        let reservation = Reservation {
            id: self.reservation_ids.next_id(),
            trip_id: trip.id,
            customer_id,
            tickets: request.tickets,
        };
        batch.push(Write::InsertReservation(reservation.clone()));

        trip.available_seats -= request.tickets;
        batch.push(Write::UpdateTrip(trip.clone()));

        self.store.commit(batch)?;
        Ok((reservation, trip))
    }

    fn find_or_stage_customer(
        &self,
        request: &ReservationRequest,
        batch: &mut WriteBatch,
    ) -> Result<CustomerId, InventoryError> {
        if let Some(customer) = self.store.customer_by_name(&request.customer_name)? {
            return Ok(customer.id);
        }

        let customer = Customer {
            id: self.customer_ids.next_id(),
            name: request.customer_name.clone(),
            email: String::new(),
            phone: request.phone.clone(),
        };
        tracing::debug!("Creating customer {} for '{}'", customer.id, customer.name);
        let id = customer.id;
        batch.push(Write::InsertCustomer(customer));
        Ok(id)
    }

    /// Cancel a reservation and give its seats back to the trip.
    ///
    /// Seats are restored exactly, with no upper clamp. If the trip has
    /// since been deleted only the reservation is removed.
    pub fn cancel(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        let trip_id = self
            .store
            .reservation(id)?
            .ok_or(InventoryError::ReservationNotFound(id))?
            .trip_id;

        self.trip_locks
            .with_lock(trip_id, || self.cancel_locked(id, trip_id))
    }

    fn cancel_locked(&self, id: ReservationId, trip_id: TripId) -> Result<Reservation, InventoryError> {
        // Another connection may have cancelled it while we waited.
        let reservation = self
            .store
            .reservation(id)?
            .ok_or(InventoryError::ReservationNotFound(id))?;

        let mut batch = WriteBatch::new();
        if let Some(mut trip) = self.store.trip(trip_id)? {
            trip.available_seats = trip
                .available_seats
                .checked_add(reservation.tickets)
                .ok_or(InventoryError::SeatOverflow(trip_id))?;
            batch.push(Write::UpdateTrip(trip));
        } else {
            tracing::warn!("Cancelling reservation {id} of deleted trip {trip_id}");
        }
        batch.push(Write::DeleteReservation(id));

        self.store.commit(batch)?;

        tracing::info!(
            "Reservation {id} cancelled, {} seats returned to trip {trip_id}",
            reservation.tickets
        );
        Ok(reservation)
    }

    /// Insert a new trip.
    pub fn add_trip(&self, trip: Trip) -> Result<(), InventoryError> {
        let id = trip.id;
        self.trip_locks.with_lock(id, || {
            self.store.commit([Write::InsertTrip(trip)].into_iter().collect())
        })?;
        tracing::info!("Trip {id} added");
        Ok(())
    }

    /// Replace a trip.
    ///
    /// When `previous_id` names a different id, the old row is removed and
    /// the new one inserted in the same commit.
    pub fn update_trip(&self, trip: Trip, previous_id: Option<TripId>) -> Result<(), InventoryError> {
        let id = trip.id;
        match previous_id.filter(|&old| old != id) {
            Some(old) => {
                let (first, second) = (old.min(id), old.max(id));
                self.trip_locks.with_lock(first, || {
                    self.trip_locks.with_lock(second, || {
                        self.require_trip(old)?;
                        self.store.commit(
                            [Write::DeleteTrip(old), Write::InsertTrip(trip)]
                                .into_iter()
                                .collect(),
                        )?;
                        Ok::<_, InventoryError>(())
                    })
                })?;
                tracing::info!("Trip {old} replaced by trip {id}");
            }
            None => {
                self.trip_locks.with_lock(id, || {
                    self.require_trip(id)?;
                    self.store
                        .commit([Write::UpdateTrip(trip)].into_iter().collect())?;
                    Ok::<_, InventoryError>(())
                })?;
                tracing::info!("Trip {id} updated");
            }
        }
        Ok(())
    }

    /// Remove a trip.
    pub fn delete_trip(&self, id: TripId) -> Result<(), InventoryError> {
        self.trip_locks.with_lock(id, || {
            self.require_trip(id)?;
            self.store.commit([Write::DeleteTrip(id)].into_iter().collect())?;
            Ok::<_, InventoryError>(())
        })?;
        tracing::info!("Trip {id} deleted");
        Ok(())
    }

    fn require_trip(&self, id: TripId) -> Result<(), InventoryError> {
        match self.store.trip(id)? {
            Some(_) => Ok(()),
            None => Err(InventoryError::TripNotFound(id)),
        }
    }

    /// Insert a new user with a unique username.
    pub fn add_user(&self, user: User) -> Result<(), InventoryError> {
        let _guard = self.user_lock.lock();

        self.ensure_username_free(&user.username, &[user.id])?;
        let id = user.id;
        self.store.commit([Write::InsertUser(user)].into_iter().collect())?;
        tracing::info!("User {id} added");
        Ok(())
    }

    /// Replace a user, optionally moving it from `previous_id`.
    pub fn update_user(&self, user: User, previous_id: Option<UserId>) -> Result<(), InventoryError> {
        let _guard = self.user_lock.lock();

        let id = user.id;
        let target = previous_id.unwrap_or(id);
        if self.store.user(target)?.is_none() {
            return Err(InventoryError::UserNotFound(target));
        }
        self.ensure_username_free(&user.username, &[id, target])?;

        let batch: WriteBatch = if target == id {
            [Write::UpdateUser(user)].into_iter().collect()
        } else {
            [Write::DeleteUser(target), Write::InsertUser(user)]
                .into_iter()
                .collect()
        };
        self.store.commit(batch)?;
        tracing::info!("User {id} updated");
        Ok(())
    }

    /// Remove a user.
    pub fn delete_user(&self, id: UserId) -> Result<(), InventoryError> {
        let _guard = self.user_lock.lock();

        if self.store.user(id)?.is_none() {
            return Err(InventoryError::UserNotFound(id));
        }
        self.store.commit([Write::DeleteUser(id)].into_iter().collect())?;
        tracing::info!("User {id} deleted");
        Ok(())
    }

    fn ensure_username_free(&self, username: &str, owners: &[UserId]) -> Result<(), InventoryError> {
        match self.store.user_by_username(username)? {
            Some(existing) if !owners.contains(&existing.id) => {
                Err(InventoryError::DuplicateUsername(username.to_string()))
            }
            _ => Ok(()),
        }
    }
}
