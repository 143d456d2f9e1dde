mod client;

pub use client::TbotClient;
