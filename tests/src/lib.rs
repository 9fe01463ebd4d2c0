//! Cross-crate integration tests for the world engine.

#[cfg(test)]
mod common_setup;
#[cfg(test)]
mod test_invariants;
#[cfg(test)]
mod test_persistence;
#[cfg(test)]
mod test_scenarios;
