//! Record encoding for the line protocol.
//!
//! Records are comma-separated field lists; lists of records are the
//! concatenation of `record;` entries.
//!
//! ```text
//! Trip:        id,attractionName,transportCompany,departureTime,price,availableSeats
//! User:        id,username,password
//! Reservation: id,tripId,customerId,tickets
//! ```

use crate::error::ProtocolError;
use crate::model::{Reservation, Trip, TripId, User, UserId};
use std::fmt::Write as _;
use std::str::FromStr;

/// Separator between fields of one record.
pub const FIELD_SEPARATOR: char = ',';

/// Terminator after each record of a list.
pub const RECORD_TERMINATOR: char = ';';

/// Characters that cannot appear inside a text field.
const RESERVED: [char; 4] = ['#', FIELD_SEPARATOR, RECORD_TERMINATOR, '\n'];

/// Types with a wire representation.
pub trait Record {
    /// Append the encoded record (without terminator) to `out`.
    fn encode_into(&self, out: &mut String);

    /// Encoded record as a new string.
    fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }
}

impl Record for Trip {
    fn encode_into(&self, out: &mut String) {
        // `{:?}` keeps a trailing ".0" on whole prices, e.g. "20.0".
        let _ = write!(
            out,
            "{},{},{},{},{:?},{}",
            self.id,
            self.attraction_name,
            self.transport_company,
            self.departure_time,
            self.price,
            self.available_seats
        );
    }
}

impl Record for User {
    fn encode_into(&self, out: &mut String) {
        let _ = write!(out, "{},{},{}", self.id, self.username, self.password);
    }
}

impl Record for Reservation {
    fn encode_into(&self, out: &mut String) {
        let _ = write!(
            out,
            "{},{},{},{}",
            self.id, self.trip_id, self.customer_id, self.tickets
        );
    }
}

/// Encode a list as `record;record;...;`.
pub fn encode_list<T: Record>(records: &[T]) -> String {
    let mut out = String::new();
    for record in records {
        record.encode_into(&mut out);
        out.push(RECORD_TERMINATOR);
    }
    out
}

/// Parse a numeric field.
///
/// # Errors
///
/// Returns `ProtocolError::InvalidNumber` if `value` is not a valid `T`.
pub fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// Parse a record id; ids start at 1.
///
/// # Errors
///
/// Returns `ProtocolError::InvalidNumber` if `value` is not a positive `u32`.
pub fn parse_id(field: &'static str, value: &str) -> Result<u32, ProtocolError> {
    match parse_number(field, value)? {
        0 => Err(ProtocolError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
        id => Ok(id),
    }
}

/// Validate a free-text field.
///
/// # Errors
///
/// Returns `ProtocolError::ReservedCharacter` if the text contains a protocol
/// separator.
pub fn parse_text(field: &'static str, value: &str) -> Result<String, ProtocolError> {
    if value.contains(RESERVED) {
        return Err(ProtocolError::ReservedCharacter(field));
    }
    Ok(value.to_string())
}

fn parse_price(value: &str) -> Result<f64, ProtocolError> {
    let price: f64 = parse_number("price", value)?;
    if !price.is_finite() || price < 0.0 {
        return Err(ProtocolError::InvalidNumber {
            field: "price",
            value: value.to_string(),
        });
    }
    Ok(price)
}

struct Fields<'a> {
    iter: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(record: &'a str) -> Self {
        Self {
            iter: record.split(FIELD_SEPARATOR),
        }
    }

    fn required(&mut self, name: &'static str) -> Result<&'a str, ProtocolError> {
        self.iter.next().ok_or(ProtocolError::MissingField(name))
    }

    fn optional(&mut self) -> Option<&'a str> {
        self.iter.next().filter(|value| !value.trim().is_empty())
    }
}

/// Decode a trip record, plus the optional trailing previous id used by
/// `UPDATE_TRIP` to rename a row.
///
/// # Errors
///
/// Returns `ProtocolError` on missing fields, bad numbers or reserved
/// characters.
pub fn decode_trip(record: &str) -> Result<(Trip, Option<TripId>), ProtocolError> {
    let mut fields = Fields::new(record);

    // Numbers are checked before text so a bad id reports as a number error.
    let id = parse_id("id", fields.required("id")?)?;
    let attraction = fields.required("attractionName")?;
    let transport = fields.required("transportCompany")?;
    let departure = fields.required("departureTime")?;
    let price = parse_price(fields.required("price")?)?;
    let available_seats = parse_number("availableSeats", fields.required("availableSeats")?)?;
    let previous_id = fields
        .optional()
        .map(|value| parse_id("previousId", value))
        .transpose()?;

    let trip = Trip {
        id,
        attraction_name: parse_text("attractionName", attraction)?,
        transport_company: parse_text("transportCompany", transport)?,
        departure_time: parse_text("departureTime", departure)?,
        price,
        available_seats,
    };
    Ok((trip, previous_id))
}

/// Decode a user record, plus the optional trailing previous id.
///
/// # Errors
///
/// Returns `ProtocolError` on missing fields, bad numbers or reserved
/// characters.
pub fn decode_user(record: &str) -> Result<(User, Option<UserId>), ProtocolError> {
    let mut fields = Fields::new(record);

    let id = parse_id("id", fields.required("id")?)?;
    let username = fields.required("username")?;
    let password = fields.required("password")?;
    let previous_id = fields
        .optional()
        .map(|value| parse_id("previousId", value))
        .transpose()?;

    if username.is_empty() {
        return Err(ProtocolError::MissingField("username"));
    }

    let user = User {
        id,
        username: parse_text("username", username)?,
        password: parse_text("password", password)?,
    };
    Ok((user, previous_id))
}

/// Id in the first field of a record (`7` or `7,Eiffel Tower,...`).
///
/// # Errors
///
/// Returns `ProtocolError::InvalidNumber` if the first field is not an id.
pub fn leading_id(record: &str) -> Result<u32, ProtocolError> {
    let first = record.split(FIELD_SEPARATOR).next().unwrap_or_default();
    parse_id("id", first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eiffel() -> Trip {
        Trip {
            id: 7,
            attraction_name: "Eiffel Tower".to_string(),
            transport_company: "BusCo".to_string(),
            departure_time: "09:00".to_string(),
            price: 20.0,
            available_seats: 30,
        }
    }

    #[test]
    fn test_encode_trip_keeps_decimal() {
        assert_eq!(eiffel().encode(), "7,Eiffel Tower,BusCo,09:00,20.0,30");

        let mut trip = eiffel();
        trip.price = 12.5;
        assert_eq!(trip.encode(), "7,Eiffel Tower,BusCo,09:00,12.5,30");
    }

    #[test]
    fn test_encode_list_terminates_each_record() {
        let users = vec![
            User {
                id: 1,
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
            User {
                id: 2,
                username: "clerk".to_string(),
                password: "pw".to_string(),
            },
        ];
        assert_eq!(encode_list(&users), "1,admin,secret;2,clerk,pw;");
        assert_eq!(encode_list::<User>(&[]), "");
    }

    #[test]
    fn test_encode_reservation() {
        let reservation = Reservation {
            id: 4,
            trip_id: 7,
            customer_id: 2,
            tickets: 3,
        };
        assert_eq!(reservation.encode(), "4,7,2,3");
    }

    #[test]
    fn test_decode_trip() {
        let (trip, previous) = decode_trip("7,Eiffel Tower,BusCo,09:00,20.0,30").unwrap();
        assert_eq!(trip, eiffel());
        assert_eq!(previous, None);

        let (_, previous) = decode_trip("8,Eiffel Tower,BusCo,09:00,20,30,7").unwrap();
        assert_eq!(previous, Some(7));
    }

    #[test]
    fn test_decode_trip_errors() {
        assert!(matches!(
            decode_trip("x,Eiffel Tower,BusCo,09:00,20.0,30"),
            Err(ProtocolError::InvalidNumber { field: "id", .. })
        ));
        assert!(matches!(
            decode_trip("7,Eiffel Tower,BusCo,09:00,20.0,-1"),
            Err(ProtocolError::InvalidNumber {
                field: "availableSeats",
                ..
            })
        ));
        assert!(matches!(
            decode_trip("7,Eiffel Tower,BusCo,09:00,-3.0,1"),
            Err(ProtocolError::InvalidNumber { field: "price", .. })
        ));
        assert!(matches!(
            decode_trip("7,Eiffel Tower,BusCo"),
            Err(ProtocolError::MissingField("departureTime"))
        ));
        assert!(matches!(
            decode_trip("7,Eiffel;Tower,BusCo,09:00,20.0,30"),
            Err(ProtocolError::ReservedCharacter("attractionName"))
        ));
    }

    #[test]
    fn test_decode_user() {
        let (user, previous) = decode_user("3,alice,pw,2").unwrap();
        assert_eq!(user.id, 3);
        assert_eq!(user.username, "alice");
        assert_eq!(previous, Some(2));

        assert!(matches!(
            decode_user("3,alice"),
            Err(ProtocolError::MissingField("password"))
        ));
        assert!(matches!(
            decode_user("3,,pw"),
            Err(ProtocolError::MissingField("username"))
        ));
    }

    #[test]
    fn test_leading_id() {
        assert_eq!(leading_id("7").unwrap(), 7);
        assert_eq!(leading_id("7,Eiffel Tower,BusCo,09:00,20.0,30").unwrap(), 7);
        assert!(leading_id("").is_err());
        assert!(leading_id("0").is_err());
    }

    #[test]
    fn test_zero_ids_rejected() {
        assert!(matches!(
            decode_trip("0,Eiffel Tower,BusCo,09:00,20.0,30"),
            Err(ProtocolError::InvalidNumber { field: "id", .. })
        ));
        assert!(matches!(
            decode_trip("7,Eiffel Tower,BusCo,09:00,20.0,30,0"),
            Err(ProtocolError::InvalidNumber {
                field: "previousId",
                ..
            })
        ));
        assert!(matches!(
            decode_user("0,alice,pw"),
            Err(ProtocolError::InvalidNumber { field: "id", .. })
        ));
        assert_eq!(parse_id("tripId", " 12 ").unwrap(), 12);
    }
}
