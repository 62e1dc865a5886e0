pub mod constants;
pub mod shared_roulette_game;
