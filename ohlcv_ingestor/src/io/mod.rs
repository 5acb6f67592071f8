pub mod csv_series;
pub mod layout;
