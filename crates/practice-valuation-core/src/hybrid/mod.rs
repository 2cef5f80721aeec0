pub mod blender;
pub mod policy;
