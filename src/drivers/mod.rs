//! Hardware initialisation and raw peripheral access.

pub mod hw_init;
