//! SQLite database for the Thorium master.

thorium_core::define_database!(MasterDatabase, "Master database migrations complete");
