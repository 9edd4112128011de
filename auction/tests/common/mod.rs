
pub use harness::MultiPeerHarness;
