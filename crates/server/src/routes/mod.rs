pub mod admin;
pub mod assignments;
pub mod auth;
pub mod coupons;
pub mod courses;
pub mod enrollments;
pub mod lessons;
pub mod modules;
pub mod users;
