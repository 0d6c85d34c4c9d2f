//! Commands sent by clients over the command channel.

/// Prefix of the identity registration command.
pub const CLIENT_ID_PREFIX: &str = "Client-ID:";

/// A recognized client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Register (or overwrite) the connection's identity.
    ///
    /// The value is trimmed but not yet validated.
    Register { client_id: String },
}

impl ClientCommand {
    /// Parses one completed line.
    ///
    /// Returns `None` for anything that is not a known command; unknown
    /// lines are ignored by the server so newer clients can send more.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(CLIENT_ID_PREFIX)?;
        Some(Self::Register {
            client_id: rest.trim().to_string(),
        })
    }
}
