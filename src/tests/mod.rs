// Test modules for Portmapper
// Each module covers the corresponding source module

mod router_tests;
