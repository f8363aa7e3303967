//! Command dispatch for the line protocol.

use crate::error::InventoryError;
use crate::protocol::records::encode_list;
use crate::protocol::{Command, Operation, Reply, Request};
use crate::registry::{ChangeEvent, ChangeKind, ConnectionId};
use crate::server::AppState;

/// Parse and execute one request line.
///
/// Returns `None` for blank lines, which get no reply. On a successful
/// mutation the change is published to every other connection before the
/// reply is returned, so a peer sees the notification ahead of any reply to
/// a request it sends afterwards.
pub fn handle_command(line: &str, origin: Option<ConnectionId>, state: &AppState) -> Option<Reply> {
    let (op, fields) = match Request::split(line) {
        Request::Empty => return None,
        Request::Unknown(keyword) => {
            tracing::debug!("Unknown command: {keyword}");
            return Some(Reply::UnknownCommand);
        }
        Request::Known(op, fields) => (op, fields),
    };

    let command = match Command::parse(op, &fields) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("Malformed {} request: {e}", op.reply_stem());
            return Some(match op {
                Operation::Login => Reply::Failure {
                    operation: op,
                    reason: None,
                },
                _ => Reply::failure(op, e),
            });
        }
    };

    let reply = match execute(command, state) {
        Ok(outcome) => {
            if let Some(kind) = outcome.change {
                state.broadcaster().publish(ChangeEvent { kind, origin });
            }
            outcome.reply
        }
        Err(e) => {
            tracing::warn!("{} failed: {e}", op.reply_stem());
            match op {
                Operation::Login => Reply::Failure {
                    operation: op,
                    reason: None,
                },
                _ => Reply::failure(op, e),
            }
        }
    };

    Some(reply)
}

/// Successful command result.
struct Outcome {
    reply: Reply,
    change: Option<ChangeKind>,
}

impl Outcome {
    const fn read(reply: Reply) -> Self {
        Self {
            reply,
            change: None,
        }
    }

    const fn mutation(op: Operation, kind: ChangeKind) -> Self {
        Self {
            reply: Reply::Success(op),
            change: Some(kind),
        }
    }
}

fn execute(command: Command, state: &AppState) -> Result<Outcome, InventoryError> {
    let inventory = state.inventory();

    let outcome = match command {
        Command::Login { username, password } => {
            let op = Operation::Login;
            if inventory.check_login(&username, &password)? {
                Outcome::read(Reply::Success(op))
            } else {
                Outcome::read(Reply::Failure {
                    operation: op,
                    reason: None,
                })
            }
        }
        Command::GetTrips => Outcome::read(Reply::Records {
            tag: "TRIPS",
            body: encode_list(&inventory.trips()?),
        }),
        Command::GetUsers => Outcome::read(Reply::Records {
            tag: "USERS",
            body: encode_list(&inventory.users()?),
        }),
        Command::SearchTrips {
            attraction,
            start,
            end,
        } => Outcome::read(Reply::Records {
            tag: "SEARCH_RESULTS",
            body: encode_list(&inventory.search_trips(&attraction, &start, &end)?),
        }),
        Command::GetReservations(trip_id) => Outcome::read(Reply::Records {
            tag: "RESERVATIONS",
            body: encode_list(&inventory.reservations(trip_id)?),
        }),
        Command::MakeReservation(request) => {
            inventory.reserve(&request)?;
            Outcome::mutation(Operation::MakeReservation, ChangeKind::Trips)
        }
        Command::CancelReservation(id) => {
            inventory.cancel(id)?;
            Outcome::mutation(Operation::CancelReservation, ChangeKind::Trips)
        }
        Command::AddTrip(trip) => {
            inventory.add_trip(trip)?;
            Outcome::mutation(Operation::AddTrip, ChangeKind::Trips)
        }
        Command::UpdateTrip { trip, previous_id } => {
            inventory.update_trip(trip, previous_id)?;
            Outcome::mutation(Operation::UpdateTrip, ChangeKind::Trips)
        }
        Command::DeleteTrip(id) => {
            inventory.delete_trip(id)?;
            Outcome::mutation(Operation::DeleteTrip, ChangeKind::Trips)
        }
        Command::AddUser(user) => {
            inventory.add_user(user)?;
            Outcome::mutation(Operation::AddUser, ChangeKind::Users)
        }
        Command::UpdateUser { user, previous_id } => {
            inventory.update_user(user, previous_id)?;
            Outcome::mutation(Operation::UpdateUser, ChangeKind::Users)
        }
        Command::DeleteUser(id) => {
            inventory.delete_user(id)?;
            Outcome::mutation(Operation::DeleteUser, ChangeKind::Users)
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Trip;
    use crate::store::MemoryStore;
    use crate::store::memory::Snapshot;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn create_test_state(seats: u32) -> Arc<AppState> {
        let store = MemoryStore::from_snapshot(Snapshot {
            trips: vec![Trip {
                id: 3,
                attraction_name: "Eiffel Tower".to_string(),
                transport_company: "BusCo".to_string(),
                departure_time: "09:00".to_string(),
                price: 20.0,
                available_seats: seats,
            }],
            ..Snapshot::default()
        })
        .unwrap();
        Arc::new(AppState::with_store(Arc::new(store), 8).unwrap())
    }

    fn run(state: &AppState, line: &str) -> String {
        handle_command(line, None, state).unwrap().to_string()
    }

    #[test]
    fn test_blank_line_gets_no_reply() {
        let state = create_test_state(10);
        assert!(handle_command("", None, &state).is_none());
        assert!(handle_command("   ", None, &state).is_none());
    }

    #[test]
    fn test_unknown_command() {
        let state = create_test_state(10);
        assert_eq!(run(&state, "BOOK_EVERYTHING#now"), "UNKNOWN_COMMAND");
    }

    #[test]
    fn test_get_trips_is_stable() {
        let state = create_test_state(10);
        let first = run(&state, "GET_TRIPS");
        assert_eq!(first, "TRIPS#3,Eiffel Tower,BusCo,09:00,20.0,10;");
        assert_eq!(run(&state, "GET_TRIPS"), first);
    }

    #[test]
    fn test_reservation_success_and_underflow() {
        let state = create_test_state(10);

        assert_eq!(
            run(&state, "MAKE_RESERVATION#Alice#555-1234#3#100"),
            "RESERVATION_FAILED#Not enough seats available"
        );
        assert_eq!(run(&state, "MAKE_RESERVATION#Alice#555-1234#3#4"), "RESERVATION_SUCCESS");
        assert_eq!(run(&state, "GET_TRIPS"), "TRIPS#3,Eiffel Tower,BusCo,09:00,20.0,6;");
        assert_eq!(run(&state, "GET_RESERVATIONS#3"), "RESERVATIONS#1,3,1,4;");
    }

    #[test]
    fn test_reservation_invalid_number_writes_nothing() {
        let state = create_test_state(10);
        let reply = run(&state, "MAKE_RESERVATION#Alice#555#notanumber#2");

        assert_eq!(reply, "RESERVATION_FAILED#Invalid number format");
        let store = state.inventory().store();
        assert!(store.customers().unwrap().is_empty());
        assert!(store.reservations().unwrap().is_empty());
    }

    #[test]
    fn test_reservation_unknown_trip() {
        let state = create_test_state(10);
        assert_eq!(
            run(&state, "MAKE_RESERVATION#Alice#555#99#1"),
            "RESERVATION_FAILED#Trip not found: 99"
        );
    }

    #[test]
    fn test_cancel_reservation() {
        let state = create_test_state(10);
        run(&state, "MAKE_RESERVATION#Alice#555#3#4");

        assert_eq!(run(&state, "CANCEL_RESERVATION#1"), "RESERVATION_CANCEL_SUCCESS");
        assert_eq!(run(&state, "GET_TRIPS"), "TRIPS#3,Eiffel Tower,BusCo,09:00,20.0,10;");
        assert_eq!(
            run(&state, "CANCEL_RESERVATION#1"),
            "RESERVATION_CANCEL_FAILED#Reservation not found: 1"
        );
    }

    #[test]
    fn test_login_replies_carry_no_reason() {
        let state = create_test_state(10);
        assert_eq!(run(&state, "ADD_USER#1,admin,secret"), "USER_ADD_SUCCESS");
        assert_eq!(run(&state, "LOGIN#admin#secret"), "LOGIN_SUCCESS");
        assert_eq!(run(&state, "LOGIN#admin#wrong"), "LOGIN_FAILED");
        assert_eq!(run(&state, "LOGIN#admin"), "LOGIN_FAILED");
    }

    #[test]
    fn test_trip_crud_replies() {
        let state = create_test_state(10);

        assert_eq!(
            run(&state, "ADD_TRIP#7,Eiffel Tower,BusCo,09:00,20.0,30"),
            "TRIP_ADD_SUCCESS"
        );
        assert_eq!(
            run(&state, "ADD_TRIP#7,Eiffel Tower,BusCo,09:00,20.0,30"),
            "TRIP_ADD_FAILED#Trip with ID 7 already exists"
        );
        assert_eq!(
            run(&state, "UPDATE_TRIP#8,Louvre,RailCo,10:00,15.5,12,7"),
            "TRIP_UPDATE_SUCCESS"
        );
        assert_eq!(
            run(&state, "ADD_TRIP#x,Louvre,RailCo,10:00,15.5,12"),
            "TRIP_ADD_FAILED#Invalid number format"
        );
        assert_eq!(run(&state, "DELETE_TRIP#8"), "TRIP_DELETE_SUCCESS");
        assert_eq!(
            run(&state, "DELETE_TRIP#8"),
            "TRIP_DELETE_FAILED#Trip not found: 8"
        );
        assert_eq!(
            run(&state, "SEARCH_TRIPS#Louvre"),
            "SEARCH_RESULTS#"
        );
    }

    #[test]
    fn test_user_crud_replies() {
        let state = create_test_state(10);

        assert_eq!(run(&state, "ADD_USER#1,admin,secret"), "USER_ADD_SUCCESS");
        assert_eq!(
            run(&state, "ADD_USER#2,admin,other"),
            "USER_ADD_FAILED#Username already exists: admin"
        );
        assert_eq!(run(&state, "UPDATE_USER#1,admin,newpw"), "USER_UPDATE_SUCCESS");
        assert_eq!(run(&state, "GET_USERS"), "USERS#1,admin,newpw;");
        assert_eq!(run(&state, "DELETE_USER#1"), "USER_DELETE_SUCCESS");
        assert_eq!(run(&state, "GET_USERS"), "USERS#");
    }

    #[tokio::test]
    async fn test_mutation_notifies_everyone_but_origin() {
        let state = create_test_state(10);
        let registry = state.broadcaster().registry();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = registry.register(tx_a);
        let _b = registry.register(tx_b);
        let mut events = state.broadcaster().subscribe();

        let reply = handle_command("ADD_TRIP#7,Eiffel Tower,BusCo,09:00,20.0,30", Some(a.id()), &state);
        assert_eq!(reply.unwrap().to_string(), "TRIP_ADD_SUCCESS");

        assert_eq!(rx_b.recv().await.unwrap(), "UPDATE_TRIPS");
        assert!(rx_a.try_recv().is_err());
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Trips);
        assert_eq!(event.origin, Some(a.id()));

        handle_command("ADD_USER#1,admin,secret", Some(a.id()), &state);
        assert_eq!(rx_b.recv().await.unwrap(), "UPDATE_USERS");
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_broadcast() {
        let state = create_test_state(10);
        let (tx, mut rx) = mpsc::channel(4);
        let _peer = state.broadcaster().registry().register(tx);

        run(&state, "MAKE_RESERVATION#Alice#555#3#100");
        run(&state, "GET_TRIPS");
        assert!(rx.try_recv().is_err());
    }
}
