/*!
# Cobbler DevKit - test doubles for the agent and the tool

- [`ScriptedDiscovery`]: a Discovery Backend that replays a fixed list of
  announcements, duplicates included, and records registrations
- [`MockAgent`]: an in-process HTTP agent with scripted behaviour, bound to
  an ephemeral loopback port
- [`test_utils`]: entry builders, node-list files and log setup for tests
*/

pub mod discovery_stub;
pub mod mock_agent;
pub mod test_utils;

pub use discovery_stub::ScriptedDiscovery;
pub use mock_agent::{AgentBehavior, MockAgent};
pub use test_utils::{entry, init_tracing, node_list_file};
