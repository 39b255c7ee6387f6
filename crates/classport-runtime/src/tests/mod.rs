mod heap_tests;
mod interp_tests;
mod monitor_tests;
mod thread_tests;
