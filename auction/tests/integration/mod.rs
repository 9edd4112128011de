mod concurrency;
mod convergence;
mod edge_cases;
mod error_cases;
