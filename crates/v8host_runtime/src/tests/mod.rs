mod cache;
mod callback_pool;
mod governor;
mod scheduler;
mod values;
