mod helpers;

mod batcher_tests;
mod invariant_tests;
