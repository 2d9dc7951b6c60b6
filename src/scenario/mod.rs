//! Scripted trading scenarios against the live exchange

mod expiry;

pub use expiry::{is_relevant, ExpiryReport, ExpiryScenario, Notification};

use std::fmt;

/// Step of a scenario, used to give failures context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStep {
    ReadSymbol,
    ReadDepth,
    PlaceSeedOrder,
    ReadSeededDepth,
    Subscribe,
    PlaceTestOrder,
    CancelSeedOrder,
}

impl fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            ScenarioStep::ReadSymbol => "reading symbol info",
            ScenarioStep::ReadDepth => "reading the initial depth",
            ScenarioStep::PlaceSeedOrder => "placing the seed order",
            ScenarioStep::ReadSeededDepth => "re-reading the depth after seeding",
            ScenarioStep::Subscribe => "opening the user data stream",
            ScenarioStep::PlaceTestOrder => "placing the immediate-or-cancel test order",
            ScenarioStep::CancelSeedOrder => "cancelling the seed order",
        };
        f.write_str(step)
    }
}
