pub mod credentials;
pub mod cron_lock;
pub mod scheduled_posts;
