#[path = "e2e/player_dig.rs"]
mod player_dig;

#[path = "e2e/rollback.rs"]
mod rollback;

#[path = "e2e/cascade.rs"]
mod cascade;

#[path = "e2e/ticks.rs"]
mod ticks;
