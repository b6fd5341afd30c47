pub mod catalog;
pub mod config;
pub mod datum;
pub mod db;
pub mod maint;
pub mod store;
pub mod tx;
