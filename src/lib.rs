pub mod app;
pub mod auth;
pub mod config;
pub mod demo_seeder;
pub mod error;
pub mod pages;
pub mod api {
    pub mod categories;
    pub mod errors;
    pub mod jobs;
    pub mod media;
    pub mod organisations;
    pub mod posts;
    pub mod stats;
    pub mod users;
    pub mod validation;
}
pub mod db {
    pub mod category_repository;
    pub mod job_repository;
    pub mod media_repository;
    pub mod memory;
    pub mod models;
    pub mod mongo;
    pub mod organisation_repository;
    pub mod post_repository;
    pub mod user_repository;
}
pub mod rendering {
    pub mod content;
}
pub mod storage {
    pub mod client;
}
