//! Interprets completed client lines as channel commands.

use tracing::{debug, trace};

use cmdchan_core::{ClientId, IdentityValidator};
use cmdchan_protocol::ClientCommand;

use super::connection::ConnectionError;
use crate::registry::Connection;

/// Applies one line to a connection.
///
/// `Client-ID:` lines are validated and stored as the connection's identity;
/// every other line is ignored. Returns the identity that was stored, if any.
///
/// # Errors
///
/// `ConnectionError::InvalidIdentity` when the validator rejects the value.
/// The connection's identity is left untouched in that case, and the caller
/// must close the connection.
pub async fn process_line(
    connection: &Connection,
    validator: &dyn IdentityValidator,
    line: &str,
) -> Result<Option<ClientId>, ConnectionError> {
    let Some(command) = ClientCommand::parse(line) else {
        trace!(connection = %connection.id(), line, "Ignoring unrecognized line");
        return Ok(None);
    };

    match command {
        ClientCommand::Register { client_id } => {
            let client_id = validator.validate(&client_id)?;
            let previous = connection.set_identity(client_id.clone()).await;

            debug!(
                connection = %connection.id(),
                client_id = %client_id,
                previous = ?previous,
                "Client registered identity"
            );

            Ok(Some(client_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionId;
    use crate::transport::Transport;
    use cmdchan_core::ClientIdRules;
    use std::net::SocketAddr;

    fn test_connection() -> Connection {
        let (_client, server) = tokio::io::duplex(64);
        Connection::new(
            ConnectionId::new(1),
            SocketAddr::from(([127, 0, 0, 1], 40001)),
            Transport::new(server),
        )
    }

    #[tokio::test]
    async fn test_register_sets_identity() {
        let conn = test_connection();
        let stored = process_line(&conn, &ClientIdRules, "Client-ID: dev-42")
            .await
            .unwrap();

        assert_eq!(stored, Some(ClientId::from("dev-42")));
        assert_eq!(conn.identity().await, Some(ClientId::from("dev-42")));
    }

    #[tokio::test]
    async fn test_later_register_overwrites() {
        let conn = test_connection();
        process_line(&conn, &ClientIdRules, "Client-ID: a").await.unwrap();
        process_line(&conn, &ClientIdRules, "Client-ID:b").await.unwrap();
        assert_eq!(conn.identity().await, Some(ClientId::from("b")));
    }

    #[tokio::test]
    async fn test_unknown_lines_are_ignored() {
        let conn = test_connection();
        for line in ["", "HELLO", "Interval=5", "client-id: lower"] {
            assert_eq!(process_line(&conn, &ClientIdRules, line).await.unwrap(), None);
        }
        assert_eq!(conn.identity().await, None);
    }

    #[tokio::test]
    async fn test_invalid_identity_is_not_stored() {
        let conn = test_connection();
        process_line(&conn, &ClientIdRules, "Client-ID: good").await.unwrap();

        let err = process_line(&conn, &ClientIdRules, "Client-ID: bad id!")
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidIdentity(_)));
        assert_eq!(conn.identity().await, Some(ClientId::from("good")));
    }

    #[tokio::test]
    async fn test_embedded_carriage_return_is_rejected() {
        let conn = test_connection();
        let result = process_line(&conn, &ClientIdRules, "Client-ID: de\rv-42").await;

        assert!(matches!(result, Err(ConnectionError::InvalidIdentity(_))));
        assert_eq!(conn.identity().await, None);
    }

    #[tokio::test]
    async fn test_empty_identity_is_rejected() {
        let conn = test_connection();
        let result = process_line(&conn, &ClientIdRules, "Client-ID:   ").await;
        assert!(result.is_err());
        assert_eq!(conn.identity().await, None);
    }
}
