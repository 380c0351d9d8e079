pub mod helpers;

mod aeon_file;
