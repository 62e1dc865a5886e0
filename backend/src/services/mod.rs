pub mod roulette_service;
