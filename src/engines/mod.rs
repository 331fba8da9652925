//! The four policy engines the Supervisor drives per pool, plus the
//! Settlement Engine they all reactively call into (spec §4.4–§4.8).

pub mod bond_collector;
pub mod kick;
pub mod lp_collector;
pub mod settlement;
pub mod take;
