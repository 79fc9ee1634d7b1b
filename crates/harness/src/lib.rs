mod faulty;
mod fixtures;
mod network;
mod peer;

pub use faulty::FaultyFs;
pub use fixtures::{purchase_rows, stock_rows, write_grid, PartLine};
pub use network::TestNetwork;
pub use peer::TestPeer;
