mod rational;

pub use rational::{InfRational, Rational};
