//! Line protocol spoken by desktop clients.
//!
//! Each request is one UTF-8 line; top-level fields are separated by `#`,
//! the first field naming the operation:
//!
//! ```text
//! LOGIN#alice#secret                     -> LOGIN_SUCCESS | LOGIN_FAILED
//! GET_TRIPS                              -> TRIPS#<trip;...>
//! SEARCH_TRIPS#Eiffel#08:00#12:00        -> SEARCH_RESULTS#<trip;...>
//! MAKE_RESERVATION#Alice#555-1234#7#2    -> RESERVATION_SUCCESS
//! ADD_TRIP#7,Eiffel Tower,BusCo,09:00,20.0,30
//!                                        -> TRIP_ADD_SUCCESS
//! ```
//!
//! Failures reply `<PREFIX>_FAILED#<reason>`. Mutations additionally push
//! `UPDATE_TRIPS` or `UPDATE_USERS` to every other connection.

use crate::error::ProtocolError;
use crate::inventory::ReservationRequest;
use crate::model::{ReservationId, Trip, TripId, User, UserId};
use std::fmt;

pub mod records;

use records::{decode_trip, decode_user, leading_id, parse_id, parse_number};

/// Separator between top-level request fields.
pub const COMMAND_SEPARATOR: char = '#';

/// Every operation a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `LOGIN#username#password`
    Login,
    /// `GET_TRIPS`
    GetTrips,
    /// `GET_USERS`
    GetUsers,
    /// `SEARCH_TRIPS#attraction[#start#end]`
    SearchTrips,
    /// `MAKE_RESERVATION#name#phone#tripId#tickets`
    MakeReservation,
    /// `CANCEL_RESERVATION#reservationId`
    CancelReservation,
    /// `GET_RESERVATIONS[#tripId]`
    GetReservations,
    /// `ADD_TRIP#<trip>`
    AddTrip,
    /// `UPDATE_TRIP#<trip>[,previousId]`
    UpdateTrip,
    /// `DELETE_TRIP#<id or trip>`
    DeleteTrip,
    /// `ADD_USER#<user>`
    AddUser,
    /// `UPDATE_USER#<user>[,previousId]`
    UpdateUser,
    /// `DELETE_USER#<id or user>`
    DeleteUser,
}

impl Operation {
    /// Resolve the command keyword of a request.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let op = match keyword {
            "LOGIN" => Self::Login,
            "GET_TRIPS" => Self::GetTrips,
            "GET_USERS" => Self::GetUsers,
            "SEARCH_TRIPS" => Self::SearchTrips,
            "MAKE_RESERVATION" => Self::MakeReservation,
            "CANCEL_RESERVATION" => Self::CancelReservation,
            "GET_RESERVATIONS" => Self::GetReservations,
            "ADD_TRIP" => Self::AddTrip,
            "UPDATE_TRIP" => Self::UpdateTrip,
            "DELETE_TRIP" => Self::DeleteTrip,
            "ADD_USER" => Self::AddUser,
            "UPDATE_USER" => Self::UpdateUser,
            "DELETE_USER" => Self::DeleteUser,
            _ => return None,
        };
        Some(op)
    }

    /// Reply stem shared by `<stem>_SUCCESS` and `<stem>_FAILED`.
    #[must_use]
    pub const fn reply_stem(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::GetTrips => "TRIPS",
            Self::GetUsers => "USERS",
            Self::SearchTrips => "SEARCH",
            Self::MakeReservation => "RESERVATION",
            Self::CancelReservation => "RESERVATION_CANCEL",
            Self::GetReservations => "RESERVATIONS",
            Self::AddTrip => "TRIP_ADD",
            Self::UpdateTrip => "TRIP_UPDATE",
            Self::DeleteTrip => "TRIP_DELETE",
            Self::AddUser => "USER_ADD",
            Self::UpdateUser => "USER_UPDATE",
            Self::DeleteUser => "USER_DELETE",
        }
    }
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Credential check
    Login {
        /// Login name
        username: String,
        /// Clear-text password
        password: String,
    },
    /// List all trips
    GetTrips,
    /// List all users
    GetUsers,
    /// Filter trips
    SearchTrips {
        /// Attraction substring (may be empty)
        attraction: String,
        /// Lower departure bound (may be empty)
        start: String,
        /// Upper departure bound (may be empty)
        end: String,
    },
    /// Book seats
    MakeReservation(ReservationRequest),
    /// Cancel a booking
    CancelReservation(ReservationId),
    /// List bookings, optionally for one trip
    GetReservations(Option<TripId>),
    /// Insert a trip
    AddTrip(Trip),
    /// Replace a trip
    UpdateTrip {
        /// New row
        trip: Trip,
        /// Id the row had before, when it changes
        previous_id: Option<TripId>,
    },
    /// Remove a trip
    DeleteTrip(TripId),
    /// Insert a user
    AddUser(User),
    /// Replace a user
    UpdateUser {
        /// New row
        user: User,
        /// Id the row had before, when it changes
        previous_id: Option<UserId>,
    },
    /// Remove a user
    DeleteUser(UserId),
}

/// First-stage split of a raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// Blank line; dropped without reply
    Empty,
    /// Keyword not in the command set
    Unknown(&'a str),
    /// Known operation with its remaining fields
    Known(Operation, Vec<&'a str>),
}

impl<'a> Request<'a> {
    /// Split a line (without its terminator) into keyword and fields.
    #[must_use]
    pub fn split(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }

        let mut parts = line.split(COMMAND_SEPARATOR);
        let keyword = parts.next().unwrap_or_default().trim();
        match Operation::from_keyword(keyword) {
            Some(op) => Self::Known(op, parts.collect()),
            None => Self::Unknown(keyword),
        }
    }
}

fn field<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, ProtocolError> {
    fields
        .get(index)
        .copied()
        .ok_or(ProtocolError::MissingField(name))
}

fn optional_field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or_default()
}

impl Command {
    /// Parse the fields following the keyword of `op`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if a field is missing or malformed.
    pub fn parse(op: Operation, fields: &[&str]) -> Result<Self, ProtocolError> {
        let command = match op {
            Operation::Login => Self::Login {
                username: field(fields, 0, "username")?.to_string(),
                password: field(fields, 1, "password")?.to_string(),
            },
            Operation::GetTrips => Self::GetTrips,
            Operation::GetUsers => Self::GetUsers,
            Operation::SearchTrips => Self::SearchTrips {
                attraction: optional_field(fields, 0).to_string(),
                start: optional_field(fields, 1).to_string(),
                end: optional_field(fields, 2).to_string(),
            },
            Operation::MakeReservation => {
                let customer_name = field(fields, 0, "customerName")?;
                let phone = field(fields, 1, "phone")?;
                let trip_id = parse_id("tripId", field(fields, 2, "tripId")?)?;
                let tickets = parse_number("tickets", field(fields, 3, "tickets")?)?;
                Self::MakeReservation(ReservationRequest {
                    customer_name: records::parse_text("customerName", customer_name)?,
                    phone: records::parse_text("phone", phone)?,
                    trip_id,
                    tickets,
                })
            }
            Operation::CancelReservation => Self::CancelReservation(parse_id(
                "reservationId",
                field(fields, 0, "reservationId")?,
            )?),
            Operation::GetReservations => {
                let trip = optional_field(fields, 0);
                if trip.trim().is_empty() {
                    Self::GetReservations(None)
                } else {
                    Self::GetReservations(Some(parse_id("tripId", trip)?))
                }
            }
            Operation::AddTrip => Self::AddTrip(decode_trip(field(fields, 0, "trip")?)?.0),
            Operation::UpdateTrip => {
                let (trip, previous_id) = decode_trip(field(fields, 0, "trip")?)?;
                Self::UpdateTrip { trip, previous_id }
            }
            Operation::DeleteTrip => Self::DeleteTrip(leading_id(field(fields, 0, "trip")?)?),
            Operation::AddUser => Self::AddUser(decode_user(field(fields, 0, "user")?)?.0),
            Operation::UpdateUser => {
                let (user, previous_id) = decode_user(field(fields, 0, "user")?)?;
                Self::UpdateUser { user, previous_id }
            }
            Operation::DeleteUser => Self::DeleteUser(leading_id(field(fields, 0, "user")?)?),
        };
        Ok(command)
    }
}

/// One reply line (without terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `<stem>_SUCCESS`
    Success(Operation),
    /// `<stem>_FAILED` or `<stem>_FAILED#reason`
    Failure {
        /// Failed operation
        operation: Operation,
        /// Reason text, if any
        reason: Option<String>,
    },
    /// `<tag>#<encoded list>`
    Records {
        /// Leading tag, e.g. `TRIPS`
        tag: &'static str,
        /// Encoded record list
        body: String,
    },
    /// `UNKNOWN_COMMAND`
    UnknownCommand,
}

impl Reply {
    /// Failure carrying `reason`.
    pub fn failure(operation: Operation, reason: impl fmt::Display) -> Self {
        Self::Failure {
            operation,
            reason: Some(reason.to_string()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(op) => write!(f, "{}_SUCCESS", op.reply_stem()),
            Self::Failure {
                operation,
                reason: None,
            } => write!(f, "{}_FAILED", operation.reply_stem()),
            Self::Failure {
                operation,
                reason: Some(reason),
            } => {
                // Keep the reply on one line whatever the error text holds.
                let reason = reason.replace(['\r', '\n'], " ");
                write!(f, "{}_FAILED#{reason}", operation.reply_stem())
            }
            Self::Records { tag, body } => write!(f, "{tag}#{body}"),
            Self::UnknownCommand => f.write_str("UNKNOWN_COMMAND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(line: &str) -> Result<Command, ProtocolError> {
        match Request::split(line) {
            Request::Known(op, fields) => Command::parse(op, &fields),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_split_request() {
        assert_eq!(Request::split(""), Request::Empty);
        assert_eq!(Request::split("  \r\n"), Request::Empty);
        assert_eq!(Request::split("FLY_ME#x"), Request::Unknown("FLY_ME"));
        assert_eq!(
            Request::split("LOGIN#a#b\r\n"),
            Request::Known(Operation::Login, vec!["a", "b"])
        );
    }

    #[test]
    fn test_parse_reservation() {
        let command = parse("MAKE_RESERVATION#Alice#555-1234#3#2").unwrap();
        assert_eq!(
            command,
            Command::MakeReservation(ReservationRequest {
                customer_name: "Alice".to_string(),
                phone: "555-1234".to_string(),
                trip_id: 3,
                tickets: 2,
            })
        );
    }

    #[test]
    fn test_parse_reservation_bad_number() {
        let err = parse("MAKE_RESERVATION#Alice#555#notanumber#2").unwrap_err();
        assert_eq!(err.to_string(), "Invalid number format");

        let err = parse("MAKE_RESERVATION#Alice#555").unwrap_err();
        assert_eq!(err.to_string(), "Missing field: tripId");

        let err = parse("CANCEL_RESERVATION#0").unwrap_err();
        assert_eq!(err.to_string(), "Invalid number format");
        assert!(parse("MAKE_RESERVATION#Alice#555#0#1").is_err());
    }

    #[test]
    fn test_parse_search_defaults() {
        assert_eq!(
            parse("SEARCH_TRIPS").unwrap(),
            Command::SearchTrips {
                attraction: String::new(),
                start: String::new(),
                end: String::new(),
            }
        );
        assert_eq!(
            parse("SEARCH_TRIPS#Eiffel#08:00#12:00").unwrap(),
            Command::SearchTrips {
                attraction: "Eiffel".to_string(),
                start: "08:00".to_string(),
                end: "12:00".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_trip_commands() {
        let Command::UpdateTrip { trip, previous_id } =
            parse("UPDATE_TRIP#8,Louvre,RailCo,10:00,15.5,12,7").unwrap()
        else {
            panic!("expected update");
        };
        assert_eq!(trip.id, 8);
        assert_eq!(previous_id, Some(7));

        assert_eq!(parse("DELETE_TRIP#7").unwrap(), Command::DeleteTrip(7));
        assert_eq!(
            parse("DELETE_TRIP#7,Louvre,RailCo,10:00,15.5,12").unwrap(),
            Command::DeleteTrip(7)
        );
    }

    #[test]
    fn test_parse_reservations_listing() {
        assert_eq!(parse("GET_RESERVATIONS").unwrap(), Command::GetReservations(None));
        assert_eq!(
            parse("GET_RESERVATIONS#4").unwrap(),
            Command::GetReservations(Some(4))
        );
    }

    #[test]
    fn test_reply_rendering() {
        assert_eq!(Reply::Success(Operation::AddTrip).to_string(), "TRIP_ADD_SUCCESS");
        assert_eq!(
            Reply::Failure {
                operation: Operation::Login,
                reason: None
            }
            .to_string(),
            "LOGIN_FAILED"
        );
        assert_eq!(
            Reply::failure(Operation::MakeReservation, "Not enough seats available").to_string(),
            "RESERVATION_FAILED#Not enough seats available"
        );
        assert_eq!(
            Reply::failure(Operation::DeleteUser, "line one\nline two").to_string(),
            "USER_DELETE_FAILED#line one line two"
        );
        assert_eq!(
            Reply::Records {
                tag: "TRIPS",
                body: String::new()
            }
            .to_string(),
            "TRIPS#"
        );
        assert_eq!(Reply::UnknownCommand.to_string(), "UNKNOWN_COMMAND");
    }
}
