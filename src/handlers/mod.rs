pub mod leaderboard;
pub mod transfers;
