pub mod explorer;
pub mod feed;
pub mod market;
pub mod nft;
pub mod research;
pub mod wallet;
pub mod web_search;
