mod object;
mod scope;

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use rustc_hash::FxHashMap;

use crate::ast::{ComparisonOperator, Expression, InfixOperator, Literal, Program, Statement};

pub use self::{
    object::Object,
    scope::{ScopeId, Scopes},
};

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(i64),
    String(String),
    Object(Rc<RefCell<Object>>),
}

/// Objects compare by identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(o) => object::write_object(f, o, &mut Vec::new()),
        }
    }
}

#[derive(Clone)]
pub struct Interpreter {
    scopes: Scopes,
    stdout: Rc<RefCell<dyn std::io::Write>>,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Error executing statement: {current_statement} - {kind}")]
    Execution {
        kind: ExecutionErrorKind,
        current_statement: Statement,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> &ExecutionErrorKind {
        match self {
            ExecutionError::Execution { kind, .. } => kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Variable already declared in this scope: {0}")]
    DuplicateDeclaration(String),
    #[error("Undeclared variable: {0}")]
    UndeclaredVariable(String),
    #[error("Cannot assign to constant: {0}")]
    ConstAssignment(String),
    #[error("Invalid assignment target: {0}")]
    InvalidAssignmentTarget(String),
    #[error("Get on non-object: {0}")]
    GetOnNonObject(String),
    #[error("Set on non-object: {0}")]
    SetOnNonObject(String),
    #[error("Undefined property: {0}")]
    UndefinedProperty(String),
    #[error("Invalid comparison: {0} {1} {2}")]
    InvalidComparison(Value, ComparisonOperator, Value),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("String repeated {0} times is too large")]
    RepetitionTooLarge(i64),
    #[error("Scope has already been discarded")]
    DiscardedScope,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        Self {
            scopes: Scopes::new(),
            stdout,
        }
    }

    pub fn root_scope(&self) -> ScopeId {
        Scopes::ROOT
    }

    pub fn child_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(parent)
    }

    pub fn discard_scope(&mut self, scope: ScopeId) {
        self.scopes.discard(scope);
    }

    /// Runs `program` against the root scope, returning the value of the
    /// last statement.
    pub fn interpret(&mut self, program: &Program) -> Result<Value, ExecutionError> {
        self.interpret_in(program, Scopes::ROOT)
    }

    pub fn interpret_in(
        &mut self,
        program: &Program,
        scope: ScopeId,
    ) -> Result<Value, ExecutionError> {
        let mut last = Value::Null;
        for stmt in program.0.iter() {
            match self.execute(stmt, scope) {
                Ok(value) => {
                    #[cfg(feature = "trace")]
                    eprintln!("[trace] {} => {}", stmt, value);
                    last = value;
                }
                Err(e) => {
                    return Err(ExecutionError::Execution {
                        kind: e,
                        current_statement: stmt.clone(),
                    })
                }
            }
        }

        Ok(last)
    }

    fn execute(&mut self, stmt: &Statement, scope: ScopeId) -> Result<Value, ExecutionErrorKind> {
        match stmt {
            Statement::Expression(expression) => self.evaluate(expression, scope),
            Statement::Print(expression) => {
                let value = self.evaluate(expression, scope)?;
                writeln!(self.stdout.borrow_mut(), "{}", value)?;
                Ok(Value::Null)
            }
            Statement::VarDeclaration {
                name,
                value,
                constant,
            } => {
                let value = self.evaluate(value, scope)?;
                self.scopes.declare(scope, name.clone(), value, *constant)?;
                Ok(Value::Null)
            }
        }
    }

    pub fn evaluate(
        &mut self,
        expression: &Expression,
        scope: ScopeId,
    ) -> Result<Value, ExecutionErrorKind> {
        match expression {
            Expression::Identifier(name) => self.scopes.get(scope, name),
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Boolean(b) => Value::Boolean(*b),
            }),
            Expression::Assign { target, value } => match target.as_ref() {
                Expression::Identifier(name) => {
                    let value = self.evaluate(value, scope)?;
                    self.scopes.assign(scope, name, value.clone())?;
                    Ok(value)
                }
                Expression::Member(object, property) => {
                    let object = match self.evaluate(object, scope)? {
                        Value::Object(object) => object,
                        value => {
                            return Err(ExecutionErrorKind::SetOnNonObject(value.to_string()))
                        }
                    };
                    let value = self.evaluate(value, scope)?;
                    object.borrow_mut().set(property.clone(), value.clone());
                    Ok(value)
                }
                target => Err(ExecutionErrorKind::InvalidAssignmentTarget(
                    target.to_string(),
                )),
            },
            Expression::Object(properties) => {
                let mut fields = FxHashMap::default();
                for property in properties {
                    let value = self.evaluate(&property.value, scope)?;
                    fields.insert(property.key.clone(), value);
                }
                Ok(Value::Object(Object::boxed(fields)))
            }
            Expression::Member(object, property) => match self.evaluate(object, scope)? {
                Value::Object(object) => {
                    let value = object.borrow().get(property);
                    value.ok_or_else(|| ExecutionErrorKind::UndefinedProperty(property.clone()))
                }
                value => Err(ExecutionErrorKind::GetOnNonObject(value.to_string())),
            },
            Expression::Comparison(a, op, b) => {
                let a = self.evaluate(a, scope)?;
                let b = self.evaluate(b, scope)?;
                compare(a, *op, b)
            }
            Expression::Binary(a, op, b) => {
                let a = self.evaluate(a, scope)?;
                let b = self.evaluate(b, scope)?;
                arithmetic(a, *op, b)
            }
        }
    }
}

fn compare(a: Value, op: ComparisonOperator, b: Value) -> Result<Value, ExecutionErrorKind> {
    match op {
        ComparisonOperator::Equal => return Ok(Value::Boolean(a == b)),
        ComparisonOperator::NotEqual => return Ok(Value::Boolean(a != b)),
        _ => {}
    }

    let ordering = match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(ExecutionErrorKind::InvalidComparison(a, op, b));
    };

    Ok(Value::Boolean(match op {
        ComparisonOperator::Equal => ordering.is_eq(),
        ComparisonOperator::NotEqual => ordering.is_ne(),
        ComparisonOperator::LessThan => ordering.is_lt(),
        ComparisonOperator::LessThanOrEqual => ordering.is_le(),
        ComparisonOperator::GreaterThan => ordering.is_gt(),
        ComparisonOperator::GreaterThanOrEqual => ordering.is_ge(),
    }))
}

/// Operand types without an arithmetic meaning produce `null` rather than an
/// error.
fn arithmetic(a: Value, op: InfixOperator, b: Value) -> Result<Value, ExecutionErrorKind> {
    Ok(match (a, op, b) {
        (Value::Number(a), InfixOperator::Plus, Value::Number(b)) => {
            Value::Number(a.wrapping_add(b))
        }
        (Value::Number(a), InfixOperator::Minus, Value::Number(b)) => {
            Value::Number(a.wrapping_sub(b))
        }
        (Value::Number(a), InfixOperator::Multiply, Value::Number(b)) => {
            Value::Number(a.wrapping_mul(b))
        }
        (Value::Number(_), InfixOperator::Divide | InfixOperator::Modulo, Value::Number(0)) => {
            return Err(ExecutionErrorKind::DivisionByZero)
        }
        (Value::Number(a), InfixOperator::Divide, Value::Number(b)) => {
            Value::Number(a.wrapping_div(b))
        }
        (Value::Number(a), InfixOperator::Modulo, Value::Number(b)) => {
            Value::Number(a.wrapping_rem(b))
        }
        (Value::String(a), InfixOperator::Plus, Value::String(b)) => Value::String(a + &b),
        (Value::String(s), InfixOperator::Multiply, Value::Number(n)) => {
            Value::String(repeat(&s, n)?)
        }
        _ => Value::Null,
    })
}

/// Upper bound, in bytes, on a string built by repetition.
const MAX_REPEATED_LENGTH: usize = 1 << 24;

fn repeat(s: &str, count: i64) -> Result<String, ExecutionErrorKind> {
    let times = usize::try_from(count).unwrap_or(0);
    match s.len().checked_mul(times) {
        Some(length) if length <= MAX_REPEATED_LENGTH => Ok(s.repeat(times)),
        _ => Err(ExecutionErrorKind::RepetitionTooLarge(count)),
    }
}
