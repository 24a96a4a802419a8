use std::collections::HashMap;
use std::fmt;

/// 输入来源
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputRedirect {
    #[default]
    None,
    /// `< file`
    File(String),
    /// here-document，内容原样作为标准输入
    HereDoc(String),
}

/// 输出目标
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputRedirect {
    #[default]
    None,
    /// `> file`
    Truncate(String),
    /// `>> file`
    Append(String),
}

/// 每个命令节点附带的局部变量与重定向
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Setup {
    pub locals: HashMap<String, String>,
    pub input: InputRedirect,
    pub output: OutputRedirect,
}

impl Setup {
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
            && self.input == InputRedirect::None
            && self.output == OutputRedirect::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simple {
    pub argv: Vec<String>,
    pub setup: Setup,
}

impl Simple {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            setup: Setup::default(),
        }
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn local(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.setup.locals.insert(name.into(), value.into());
        self
    }

    pub fn stdin(mut self, input: InputRedirect) -> Self {
        self.setup.input = input;
        self
    }

    pub fn stdout(mut self, output: OutputRedirect) -> Self {
        self.setup.output = output;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subshell {
    pub inner: Box<Node>,
    pub setup: Setup,
}

/// 解析器交付的一行命令树
///
/// 管道沿左侧嵌套：`a | b | c` 为 `Pipe{ Pipe{a, b}, c }`，右侧永远存在。
/// 其余二元运算符的右侧可以缺省（行尾的 `;` 或 `&`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Simple(Simple),
    Pipe {
        left: Box<Node>,
        right: Box<Node>,
    },
    Sequence {
        left: Box<Node>,
        right: Option<Box<Node>>,
    },
    And {
        left: Box<Node>,
        right: Option<Box<Node>>,
    },
    Or {
        left: Box<Node>,
        right: Option<Box<Node>>,
    },
    Background {
        left: Box<Node>,
        right: Option<Box<Node>>,
    },
    Subshell(Subshell),
}

impl Node {
    pub fn simple<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Node::Simple(Simple::new(argv))
    }

    pub fn pipe(left: Node, right: Node) -> Self {
        Node::Pipe {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn sequence(left: Node, right: Option<Node>) -> Self {
        Node::Sequence {
            left: Box::new(left),
            right: right.map(Box::new),
        }
    }

    pub fn and(left: Node, right: Node) -> Self {
        Node::And {
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn or(left: Node, right: Node) -> Self {
        Node::Or {
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn background(left: Node, right: Option<Node>) -> Self {
        Node::Background {
            left: Box::new(left),
            right: right.map(Box::new),
        }
    }

    pub fn subshell(inner: Node) -> Self {
        Node::Subshell(Subshell {
            inner: Box::new(inner),
            setup: Setup::default(),
        })
    }

    /// 节点自身附带的局部变量与重定向（只有叶子节点才有）
    pub fn setup(&self) -> Option<&Setup> {
        match self {
            Node::Simple(simple) => Some(&simple.setup),
            Node::Subshell(sub) => Some(&sub.setup),
            _ => None,
        }
    }

    /// 把 `[a, b, c]` 折叠为 `a | b | c`
    pub fn pipeline(stages: Vec<Node>) -> Option<Self> {
        let mut stages = stages.into_iter();
        let first = stages.next()?;
        Some(stages.fold(first, Node::pipe))
    }
}

impl From<Simple> for Node {
    fn from(simple: Simple) -> Self {
        Node::Simple(simple)
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.input {
            InputRedirect::None => {}
            InputRedirect::File(path) => write!(f, " < {}", path)?,
            InputRedirect::HereDoc(_) => write!(f, " <<HERE")?,
        }
        match &self.output {
            OutputRedirect::None => Ok(()),
            OutputRedirect::Truncate(path) => write!(f, " > {}", path),
            OutputRedirect::Append(path) => write!(f, " >> {}", path),
        }
    }
}

fn write_tail(f: &mut fmt::Formatter<'_>, op: &str, right: &Option<Box<Node>>) -> fmt::Result {
    match right {
        Some(right) => write!(f, " {} {}", op, right),
        None => write!(f, " {}", op),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Simple(simple) => write!(f, "{}{}", simple.argv.join(" "), simple.setup),
            Node::Pipe { left, right } => write!(f, "{} | {}", left, right),
            Node::Sequence { left, right } => {
                write!(f, "{}", left)?;
                match right {
                    Some(right) => write!(f, "; {}", right),
                    None => write!(f, ";"),
                }
            }
            Node::And { left, right } => {
                write!(f, "{}", left)?;
                write_tail(f, "&&", right)
            }
            Node::Or { left, right } => {
                write!(f, "{}", left)?;
                write_tail(f, "||", right)
            }
            Node::Background { left, right } => {
                write!(f, "{}", left)?;
                write_tail(f, "&", right)
            }
            Node::Subshell(sub) => write!(f, "( {} ){}", sub.inner, sub.setup),
        }
    }
}
