pub mod access;
pub mod catalog;
pub mod certificate;
pub mod coupons;
pub mod enrollment;
pub mod mailer;
pub mod progress;
pub mod quiz;
