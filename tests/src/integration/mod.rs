//! Integration scenarios over the in-memory broker.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod delivery;
#[cfg(test)]
mod greetings_e2e;
#[cfg(test)]
mod races;
