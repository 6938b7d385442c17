use std::fmt;

/// One raw protocol call a driver can issue against its device.
///
/// A command identifies both the transport channel and the command name, so
/// the same name on different channels is two distinct calls. The data
/// collector uses the whole value as its deduplication key: however many
/// logical fields name a command, its response is fetched once per pass and
/// shared between them.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MinerCommand {
    /// A command sent over the legacy JSON-over-TCP control socket.
    Rpc { command: &'static str },
    /// An endpoint fetched over the device's web API.
    Web { command: &'static str },
}

impl MinerCommand {
    /// The command or endpoint name without the transport.
    pub fn name(&self) -> &'static str {
        match self {
            MinerCommand::Rpc { command } => command,
            MinerCommand::Web { command } => command,
        }
    }
}

impl fmt::Display for MinerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerCommand::Rpc { command } => write!(f, "rpc:{command}"),
            MinerCommand::Web { command } => write!(f, "web:{command}"),
        }
    }
}
