//! Greeter to haiku writer

use crate::agent::{Agent, CapabilityTier};

pub(super) fn agents() -> (Vec<Agent>, &'static str) {
    let haiku = Agent::new(
        "haiku",
        "Ask the user for a topic, then reply with a haiku about that topic.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_handoff_description("Agent that writes haikus.");

    let greeter = Agent::new(
        "greeter",
        "Please greet the user and ask them if they'd like a Haiku. \
         If yes, hand off to the 'haiku' agent.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_handoff("haiku")
    .with_handoff_description("Agent that greets the user.");

    (vec![greeter, haiku], "greeter")
}
