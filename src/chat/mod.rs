pub mod client;
pub mod rest;

#[cfg(test)]
pub mod testing;
