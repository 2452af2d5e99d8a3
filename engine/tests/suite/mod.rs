mod confirmation;
mod disambiguation;
mod gating;
mod identity;
mod sqlite;
mod tamper;
