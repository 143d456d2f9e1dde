pub mod aggregator;
pub mod leaderboard;
pub mod reputation;
pub mod transfers;
