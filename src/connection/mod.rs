//! Bank connections: one row per bank account a user has linked through the
//! aggregator's consent flow.

mod core;
mod endpoints;

pub use core::{
    BankConnection, ConnectionId, ConnectionStatus, count_connected, create_bank_connection,
    create_bank_connection_table, delete_bank_connection, get_bank_connection,
    list_connected_oldest_first, list_connections, map_connection_row, mark_synced,
};
pub use endpoints::{connect_bank, finalize_connection, list_banks, remove_bank};
