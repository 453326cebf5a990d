mod fakes;
mod router_tests;
