//! Growth Tracker - Desktop Entry Point
//!
//! Mobile builds enter through `growth_tracker_lib::run` directly.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    growth_tracker_lib::run();
}
