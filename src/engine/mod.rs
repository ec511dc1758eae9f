pub mod bot_state;
pub mod eligibility;
pub mod signals;
pub mod sniper;
