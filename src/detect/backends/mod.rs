pub mod fixture;
pub mod scripted;

pub use fixture::FixtureSource;
pub use scripted::ScriptedSource;
