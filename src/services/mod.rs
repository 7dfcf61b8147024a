pub mod budget_service;
pub mod cost_index_service;
pub mod currency_service;
pub mod distance_budget_service;
pub mod recalc_service;
