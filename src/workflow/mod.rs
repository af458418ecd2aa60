pub mod canvas;
pub mod compiler;
pub mod runner;

pub use canvas::{CanvasData, CanvasEdge, CanvasNode};
pub use compiler::{
    CompileResult, WorkflowCompiler, WorkflowGraph, WorkflowNode, WorkflowNodeType,
};
pub use runner::{WorkflowProgress, WorkflowRunner, WorkflowStatus};
