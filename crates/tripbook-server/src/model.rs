//! Domain records shared by the store, the inventory service and the wire codec.

use serde::{Deserialize, Serialize};

/// Trip identifier.
pub type TripId = u32;
/// Customer identifier.
pub type CustomerId = u32;
/// Reservation identifier.
pub type ReservationId = u32;
/// User identifier.
pub type UserId = u32;

/// A bookable departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Unique trip id
    pub id: TripId,
    /// Attraction visited by the trip
    pub attraction_name: String,
    /// Operator running the transport
    pub transport_company: String,
    /// Departure time as free text (e.g. "09:00")
    pub departure_time: String,
    /// Ticket price
    pub price: f64,
    /// Seats still bookable
    pub available_seats: u32,
}

impl Trip {
    /// Whether the attraction name contains `partial`.
    ///
    /// An empty needle matches every trip.
    #[must_use]
    pub fn attraction_contains(&self, partial: &str) -> bool {
        self.attraction_name.contains(partial)
    }

    /// Whether the departure time falls in `[start, end]`.
    ///
    /// Only the first five characters (`HH:MM`) are compared, lexicographically.
    #[must_use]
    pub fn departs_between(&self, start: &str, end: &str) -> bool {
        let key: String = self.departure_time.chars().take(5).collect();
        key.as_str() >= start && key.as_str() <= end
    }
}

/// A person holding reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Unique customer id
    pub id: CustomerId,
    /// Name, used as the lookup key
    pub name: String,
    /// Email (empty for customers created through a reservation)
    pub email: String,
    /// Phone number
    pub phone: String,
}

/// A booking of some seats on one trip by one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation id
    pub id: ReservationId,
    /// Booked trip
    pub trip_id: TripId,
    /// Customer holding the booking
    pub customer_id: CustomerId,
    /// Number of seats taken
    pub tickets: u32,
}

/// An operator account able to log in from a desktop client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user id
    pub id: UserId,
    /// Login name, unique across users
    pub username: String,
    /// Password, compared verbatim
    pub password: String,
}
