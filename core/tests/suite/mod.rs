mod embedded;
mod escalation;
mod registry;
