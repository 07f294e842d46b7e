pub mod servod;
