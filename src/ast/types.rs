//! Checked types of the source language.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Char,
    Double,
    Void,
    Pointer(Box<Type>),
    Function { ret: Box<Type>, args: Vec<Type> },
}

impl Type {
    pub fn pointer_to(target: Type) -> Type {
        Type::Pointer(Box::new(target))
    }

    pub fn function(ret: Type, args: Vec<Type>) -> Type {
        Type::Function {
            ret: Box::new(ret),
            args,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    /// Plain scalar values that fit one machine word.
    pub fn is_pod(&self) -> bool {
        matches!(self, Type::Int | Type::Char | Type::Double | Type::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(target) => Some(target),
            _ => None,
        }
    }

    /// Function type behind a function or a function pointer.
    fn signature(&self) -> Option<(&Type, &[Type])> {
        match self {
            Type::Function { ret, args } => Some((ret, args)),
            Type::Pointer(target) => target.signature(),
            _ => None,
        }
    }

    pub fn arg_type(&self, index: usize) -> Option<&Type> {
        self.signature().and_then(|(_, args)| args.get(index))
    }

    pub fn arg_count(&self) -> usize {
        self.signature().map_or(0, |(_, args)| args.len())
    }

    pub fn return_type(&self) -> Option<&Type> {
        self.signature().map(|(ret, _)| ret)
    }

    /// Result type of an arithmetic operator applied to `lhs` and `rhs`.
    pub fn arithmetic(lhs: &Type, rhs: &Type) -> Type {
        match (lhs, rhs) {
            (Type::Double, _) | (_, Type::Double) => Type::Double,
            (Type::Char, Type::Char) => Type::Char,
            (Type::Pointer(_), _) => lhs.clone(),
            _ => Type::Int,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Char => write!(f, "char"),
            Type::Double => write!(f, "double"),
            Type::Void => write!(f, "void"),
            Type::Pointer(target) => write!(f, "{}*", target),
            Type::Function { ret, args } => {
                write!(f, "{}(", ret)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_queries() {
        let sq = Type::function(Type::Int, vec![Type::Int, Type::Char]);
        assert!(sq.is_function());
        assert_eq!(sq.arg_count(), 2);
        assert_eq!(sq.arg_type(1), Some(&Type::Char));
        assert_eq!(sq.return_type(), Some(&Type::Int));

        let ptr = Type::pointer_to(sq);
        assert!(ptr.is_pointer());
        assert_eq!(ptr.arg_count(), 2);
        assert_eq!(ptr.to_string(), "int(int, char)*");
    }

    #[test]
    fn test_arithmetic_result() {
        assert_eq!(Type::arithmetic(&Type::Int, &Type::Double), Type::Double);
        assert_eq!(Type::arithmetic(&Type::Char, &Type::Char), Type::Char);
        assert_eq!(Type::arithmetic(&Type::Char, &Type::Int), Type::Int);
        assert!(!Type::Void.is_pod());
    }
}
