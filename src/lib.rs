//! Protohackers problem 6: the speed daemon.

pub mod speed;
