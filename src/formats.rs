pub mod deck;
pub mod gaussian_in;
pub mod gaussian_out;
pub mod xyz;
