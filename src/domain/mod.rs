// Domain layer - Media metadata, action rules and the plan editor

pub mod editor;
pub mod model;
pub mod rules;
