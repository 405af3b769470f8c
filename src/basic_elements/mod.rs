pub mod args;
pub mod keys;
pub mod next_arg;
pub mod serializers;
