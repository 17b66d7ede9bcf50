pub mod aggregate;
pub mod cli;
pub mod logging;
pub mod mcp;
pub mod settings;
pub mod vcloud;

#[cfg(test)]
mod tests;
