use crate::shell::ast::Node;
use crate::shell::error::{ShellError, ShellResult};

/// 沿管道节点的左侧脊柱收集阶段，结果按书写顺序排列（第 0 个在最左边）。
///
/// 每个阶段必须是非空的简单命令或子 shell，否则命令树已损坏。
pub fn collect_stages(node: &Node) -> ShellResult<Vec<&Node>> {
    let mut stages = Vec::new();
    let mut current = node;
    loop {
        match current {
            Node::Pipe { left, right } => {
                stages.push(check_stage(right)?);
                current = left;
            }
            other => {
                stages.push(check_stage(other)?);
                break;
            }
        }
    }
    stages.reverse();
    Ok(stages)
}

fn check_stage(node: &Node) -> ShellResult<&Node> {
    match node {
        Node::Simple(simple) if simple.argv.is_empty() => Err(ShellError::MalformedTree(
            "empty command in pipeline".to_string(),
        )),
        Node::Simple(_) | Node::Subshell(_) => Ok(node),
        other => Err(ShellError::MalformedTree(format!(
            "unexpected pipeline stage: {}",
            other
        ))),
    }
}

/// 后写者优先：后面失败的阶段覆盖前面失败的阶段，全部成功为 0
pub fn aggregate_status(statuses: &[i32]) -> i32 {
    statuses
        .iter()
        .rev()
        .copied()
        .find(|&status| status != 0)
        .unwrap_or(0)
}
