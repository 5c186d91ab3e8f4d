pub mod apk;
pub mod devices;
pub mod input;
pub mod install;
pub mod locator;
pub mod runner;
