mod concurrency;
mod forwarding;
mod persistence;
mod topology_store;
