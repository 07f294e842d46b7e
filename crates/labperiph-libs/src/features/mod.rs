pub mod library_hosting;
pub mod registration;
