// Expression parser - binds text to a typed tree in one pass

use super::overload::{self, OverloadError};
use super::params::{Parameter, ParameterTable};
use super::scope::ScopeStack;
use super::sequence::{self, Argument, LambdaRole};
use crate::config;
use crate::error::{CompileError, CompileResult, LexError, ParseError};
use crate::expression::{BinaryOperator, Expr, ExprKind, SequenceMethod, UnaryOperator};
use crate::syntax::{Lexer, Token, TokenKind};
use crate::types::conversion::{self, ConversionKind};
use crate::types::{ClassDef, FieldDef, Member, MemberKind, MemberResolver, Type, Value};

/// Context keywords and the symbols that always stand for them
const CONTEXT_KEYWORDS: [(&str, char); 3] = [("it", '$'), ("parent", '^'), ("root", '~')];

/// Numeric types tried, in order, when neither operand converts to the other
const COMMON_NUMERIC: [Type; 6] = [
    Type::Int32,
    Type::UInt32,
    Type::Int64,
    Type::UInt64,
    Type::Float32,
    Type::Float64,
];

/// One key of an ordering clause
#[derive(Debug, Clone)]
pub struct OrderingClause {
    pub expr: Expr,
    pub descending: bool,
}

pub struct Parser<'r> {
    lexer: Lexer,
    token: Token,
    peeked: Option<Token>,
    resolver: &'r dyn MemberResolver,
    scope: ScopeStack,
    params: ParameterTable,
    context_keywords: bool,
}

impl<'r> Parser<'r> {
    /// Parser over `text` with `element` as the root scope type.
    ///
    /// The context-keyword toggle is read once here.
    pub fn new(
        text: &str,
        element: Type,
        params: Vec<Parameter>,
        resolver: &'r dyn MemberResolver,
    ) -> CompileResult<Self> {
        Self::with_context_keywords(
            text,
            element,
            params,
            resolver,
            config::context_keywords_enabled(),
        )
    }

    pub(crate) fn with_context_keywords(
        text: &str,
        element: Type,
        params: Vec<Parameter>,
        resolver: &'r dyn MemberResolver,
        context_keywords: bool,
    ) -> CompileResult<Self> {
        let mut lexer = Lexer::new(text);
        let token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            token,
            peeked: None,
            resolver,
            scope: ScopeStack::new(element),
            params: ParameterTable::new(params),
            context_keywords,
        })
    }

    /// Parse the whole text as a single expression
    pub fn parse(mut self) -> CompileResult<Expr> {
        let expr = self.parse_expression()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse `expr [asc|desc], ...`
    pub fn parse_ordering(mut self) -> CompileResult<Vec<OrderingClause>> {
        let mut clauses = vec![];
        loop {
            let offset = self.token.offset;
            let expr = self.parse_expression()?;
            if !expr.ty.is_comparable() {
                return Err(type_mismatch("an ordered type", &expr.ty, offset));
            }

            let descending = if self.token.is_word("asc") || self.token.is_word("ascending") {
                self.advance()?;
                false
            } else if self.token.is_word("desc") || self.token.is_word("descending") {
                self.advance()?;
                true
            } else {
                false
            };
            clauses.push(OrderingClause { expr, descending });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.expect_end()?;
        Ok(clauses)
    }

    // ---- grammar ----

    fn parse_expression(&mut self) -> CompileResult<Expr> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> CompileResult<Expr> {
        let offset = self.token.offset;
        let test = self.parse_or()?;
        if !self.match_token(&TokenKind::Question) {
            return Ok(test);
        }
        self.advance()?;
        let if_true = self.parse_expression()?;
        self.expect_token(TokenKind::Colon)?;
        let if_false = self.parse_expression()?;
        self.bind_conditional(test, if_true, if_false, offset)
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenKind::BarBar) || self.match_token(&TokenKind::Or) {
            let offset = self.advance()?.offset;
            let right = self.parse_and()?;
            left = self.bind_logical(BinaryOperator::OrElse, left, right, offset)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.match_token(&TokenKind::AmpAmp) || self.match_token(&TokenKind::And) {
            let offset = self.advance()?.offset;
            let right = self.parse_equality()?;
            left = self.bind_logical(BinaryOperator::AndAlso, left, right, offset)?;
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.token.kind {
                TokenKind::Equal | TokenKind::EqualEqual => BinaryOperator::Eq,
                TokenKind::NotEqual | TokenKind::LessGreater => BinaryOperator::Ne,
                TokenKind::In => {
                    let offset = self.advance()?.offset;
                    left = self.parse_in(left, offset)?;
                    continue;
                }
                _ => return Ok(left),
            };
            let offset = self.advance()?.offset;
            let right = self.parse_relational()?;
            left = self.bind_comparison(op, left, right, offset)?;
        }
    }

    fn parse_in(&mut self, item: Expr, offset: usize) -> CompileResult<Expr> {
        if !self.match_token(&TokenKind::LeftParen) {
            let source = self.parse_relational()?;
            return self.bind_contains(source, item, offset);
        }

        self.advance()?;
        let mut candidates = vec![self.parse_expression()?];
        while self.match_token(&TokenKind::Comma) {
            self.advance()?;
            candidates.push(self.parse_expression()?);
        }
        self.expect_token(TokenKind::RightParen)?;

        if candidates.len() == 1 && candidates[0].ty.element_type().is_some() {
            let source = candidates.remove(0);
            return self.bind_contains(source, item, offset);
        }

        let mut result: Option<Expr> = None;
        for candidate in candidates {
            let test = self.bind_comparison(BinaryOperator::Eq, item.clone(), candidate, offset)?;
            result = Some(match result {
                Some(acc) => Expr::binary(BinaryOperator::OrElse, acc, test, Type::Boolean),
                None => test,
            });
        }
        result.ok_or_else(|| self.unexpected("expression"))
    }

    fn parse_relational(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.token.kind {
                TokenKind::Less => BinaryOperator::Lt,
                TokenKind::LessEqual => BinaryOperator::Le,
                TokenKind::Greater => BinaryOperator::Gt,
                TokenKind::GreaterEqual => BinaryOperator::Ge,
                _ => return Ok(left),
            };
            let offset = self.advance()?.offset;
            let right = self.parse_additive()?;
            left = self.bind_comparison(op, left, right, offset)?;
        }
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.token.kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                TokenKind::Bar => BinaryOperator::BitOr,
                // after an operand `^` is xor, never the parent symbol
                TokenKind::Caret => BinaryOperator::BitXor,
                _ => return Ok(left),
            };
            let offset = self.advance()?.offset;
            let right = self.parse_multiplicative()?;
            left = self.bind_binary(op, left, right, offset)?;
        }
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.token.kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::Percent => BinaryOperator::Rem,
                TokenKind::Amp => BinaryOperator::BitAnd,
                TokenKind::ShiftLeft => BinaryOperator::Shl,
                TokenKind::ShiftRight => BinaryOperator::Shr,
                _ => return Ok(left),
            };
            let offset = self.advance()?.offset;
            let right = self.parse_unary()?;
            left = self.bind_binary(op, left, right, offset)?;
        }
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        match self.token.kind {
            TokenKind::Minus => {
                let offset = self.advance()?.offset;
                let operand = self.parse_unary()?;
                self.bind_negate(operand, offset)
            }
            TokenKind::Bang | TokenKind::Not => {
                let offset = self.advance()?.offset;
                let operand = self.parse_unary()?;
                self.bind_not(operand, offset)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary_start()?;
        loop {
            match self.token.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    expr = self.parse_member_access(expr)?;
                }
                TokenKind::LeftBracket => expr = self.parse_indexer(expr)?,
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary_start(&mut self) -> CompileResult<Expr> {
        match self.token.kind {
            TokenKind::Integer => self.parse_integer_literal(),
            TokenKind::Real => self.parse_real_literal(),
            TokenKind::String => {
                let token = self.advance()?;
                Ok(Expr::literal(Value::String(token.text)))
            }
            TokenKind::True => {
                self.advance()?;
                Ok(Expr::literal(Value::Boolean(true)))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Expr::literal(Value::Boolean(false)))
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Expr::literal(Value::Null))
            }
            TokenKind::Placeholder(index) => {
                let offset = self.advance()?.offset;
                Ok(self.params.bind(index, offset)?)
            }
            TokenKind::Dollar => {
                self.advance()?;
                Ok(self.scope.current())
            }
            TokenKind::Caret => {
                let offset = self.advance()?.offset;
                self.parent_reference("^", offset)
            }
            TokenKind::Tilde => {
                self.advance()?;
                Ok(self.scope.root())
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect_token(TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::New => self.parse_new(),
            TokenKind::Identifier => self.parse_identifier(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_integer_literal(&mut self) -> CompileResult<Expr> {
        let token = self.advance()?;
        let lower = token.text.to_ascii_lowercase();
        let (digits, radix) = match lower.strip_prefix("0x") {
            Some(hex) => (hex, 16),
            None => (lower.as_str(), 10),
        };
        let split = digits
            .find(|c: char| c == 'u' || c == 'l')
            .unwrap_or(digits.len());
        let (digits, suffix) = digits.split_at(split);
        let value = u64::from_str_radix(digits, radix).map_err(|_| LexError::InvalidNumber {
            text: token.text.clone(),
            offset: token.offset,
        })?;

        let fits_i32 = value <= i32::MAX as u64;
        let fits_u32 = value <= u32::MAX as u64;
        let fits_i64 = value <= i64::MAX as u64;
        let literal = match suffix {
            "" if fits_i32 => Value::Int32(value as i32),
            "" | "u" if fits_u32 => Value::UInt32(value as u32),
            "" | "l" if fits_i64 => Value::Int64(value as i64),
            _ => Value::UInt64(value),
        };
        Ok(Expr::literal(literal))
    }

    fn parse_real_literal(&mut self) -> CompileResult<Expr> {
        let token = self.advance()?;
        let lower = token.text.to_ascii_lowercase();
        let (digits, single) = match lower.strip_suffix('f') {
            Some(digits) => (digits, true),
            None => (lower.strip_suffix('d').unwrap_or(&lower), false),
        };
        let value: f64 = digits.parse().map_err(|_| LexError::InvalidNumber {
            text: token.text.clone(),
            offset: token.offset,
        })?;
        Ok(Expr::literal(if single {
            Value::Float32(value as f32)
        } else {
            Value::Float64(value)
        }))
    }

    fn parse_identifier(&mut self) -> CompileResult<Expr> {
        let token = self.advance()?;
        let name = token.text.as_str();
        let offset = token.offset;

        if self.context_keywords {
            if name.eq_ignore_ascii_case("it") {
                return Ok(self.scope.current());
            }
            if name.eq_ignore_ascii_case("parent") {
                return self.parent_reference(name, offset);
            }
            if name.eq_ignore_ascii_case("root") {
                return Ok(self.scope.root());
            }
        }
        if name.eq_ignore_ascii_case("iif") && self.match_token(&TokenKind::LeftParen) {
            return self.parse_iif(offset);
        }
        if let Some(range) = self.scope.resolve(name) {
            return Ok(range);
        }

        let it = self.scope.current();
        if self.match_token(&TokenKind::LeftParen) {
            if self.is_callable(&it.ty, name) {
                return self.parse_method_call(it, name, offset);
            }
        } else if let Some(member) = self.resolver.find_member(&it.ty, name) {
            return Ok(member_access(it, member));
        }

        if let Some(ty) = self.find_type(name) {
            return self.parse_type_access(ty, name, offset);
        }

        if let Some((_, symbol)) = CONTEXT_KEYWORDS
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(name))
        {
            return Err(ParseError::ContextKeywordDisabled {
                keyword: name.to_string(),
                symbol: *symbol,
                offset,
            }
            .into());
        }
        Err(ParseError::UnknownIdentifier {
            name: name.to_string(),
            offset,
        }
        .into())
    }

    fn parent_reference(&self, keyword: &str, offset: usize) -> CompileResult<Expr> {
        self.scope.parent().ok_or_else(|| {
            ParseError::NoEnclosingScope {
                keyword: keyword.to_string(),
                offset,
            }
            .into()
        })
    }

    fn find_type(&self, name: &str) -> Option<Type> {
        self.resolver
            .find_type(name, self.scope.root_type())
            .or_else(|| Type::from_predefined_name(name))
    }

    fn is_callable(&self, ty: &Type, name: &str) -> bool {
        (ty.element_type().is_some() && SequenceMethod::from_name(name).is_some())
            || !self.resolver.find_methods(ty, name).is_empty()
    }

    /// `Type.Constant` or `Type(expr)`
    fn parse_type_access(&mut self, ty: Type, name: &str, offset: usize) -> CompileResult<Expr> {
        match self.token.kind {
            TokenKind::Dot => {
                self.advance()?;
                let member = self.expect_identifier()?;
                match self.resolver.find_member(&ty, &member.text) {
                    Some(Member {
                        kind: MemberKind::Constant(value),
                        ty: member_ty,
                        ..
                    }) => Ok(Expr::typed_literal(value, member_ty)),
                    _ => Err(ParseError::UnknownMember {
                        member: member.text,
                        type_name: ty.to_string(),
                        offset: member.offset,
                    }
                    .into()),
                }
            }
            TokenKind::LeftParen => {
                let mut args = self.parse_argument_list()?;
                if args.len() != 1 {
                    return Err(ParseError::NoApplicableMethod {
                        method: name.to_string(),
                        type_name: ty.to_string(),
                        arguments: describe_args(&args),
                        offset,
                    }
                    .into());
                }
                let operand = args.remove(0);
                self.bind_explicit_conversion(operand, ty, offset)
            }
            _ => Err(self.unexpected("'.' or '(' after type name")),
        }
    }

    fn parse_member_access(&mut self, target: Expr) -> CompileResult<Expr> {
        let token = self.expect_identifier()?;
        if self.match_token(&TokenKind::LeftParen) {
            return self.parse_method_call(target, &token.text, token.offset);
        }
        match self.resolver.find_member(&target.ty, &token.text) {
            Some(member) => Ok(member_access(target, member)),
            None => Err(ParseError::UnknownMember {
                member: token.text,
                type_name: target.ty.to_string(),
                offset: token.offset,
            }
            .into()),
        }
    }

    fn parse_method_call(&mut self, target: Expr, name: &str, offset: usize) -> CompileResult<Expr> {
        if let Some(element) = target.ty.element_type().cloned() {
            if let Some(method) = SequenceMethod::from_name(name) {
                return self.parse_sequence_call(target, element, method, offset);
            }
        }

        let candidates = self.resolver.find_methods(&target.ty, name);
        let args = self.parse_argument_list()?;
        match overload::resolve(self.resolver, &candidates, &args) {
            Ok(chosen) => {
                let ty = chosen.method.ret.clone();
                Ok(Expr::new(
                    ExprKind::Call {
                        target: Box::new(target),
                        method: chosen.method,
                        args: chosen.args,
                    },
                    ty,
                ))
            }
            Err(OverloadError::NoApplicable) => Err(ParseError::NoApplicableMethod {
                method: name.to_string(),
                type_name: target.ty.to_string(),
                arguments: describe_args(&args),
                offset,
            }
            .into()),
            Err(OverloadError::Ambiguous(tied)) => Err(ParseError::AmbiguousMethod {
                method: name.to_string(),
                type_name: target.ty.to_string(),
                candidates: tied.join(", "),
                offset,
            }
            .into()),
        }
    }

    fn parse_sequence_call(
        &mut self,
        target: Expr,
        element: Type,
        method: SequenceMethod,
        offset: usize,
    ) -> CompileResult<Expr> {
        self.expect_token(TokenKind::LeftParen)?;
        let body_offset = self.token.offset;

        let (lambda, arg) = match sequence::argument(method) {
            Argument::None => (None, None),
            Argument::Value => {
                let arg = self.parse_expression()?;
                let expected = match method {
                    SequenceMethod::Contains => element.clone(),
                    _ => Type::Int32,
                };
                match overload::promote(self.resolver, &arg, &expected, true) {
                    Some(promoted) => (None, Some(promoted.expr)),
                    None => {
                        return Err(ParseError::NoApplicableMethod {
                            method: method.as_str().to_string(),
                            type_name: target.ty.to_string(),
                            arguments: arg.ty.to_string(),
                            offset,
                        }
                        .into())
                    }
                }
            }
            Argument::OptionalLambda if self.match_token(&TokenKind::RightParen) => (None, None),
            Argument::OptionalLambda | Argument::Lambda => {
                (Some(self.parse_lambda(&element)?), None)
            }
        };
        self.expect_token(TokenKind::RightParen)?;

        let role = sequence::lambda_role(method);
        let lambda = match lambda {
            None if sequence::implies_identity(method) => {
                Some(Expr::parameter(self.scope.depth(), element.clone()))
            }
            other => other,
        };
        if let Some(body) = &lambda {
            if !sequence::accepts(role, &body.ty) {
                return Err(type_mismatch(role_name(role), &body.ty, body_offset));
            }
        }

        let ty = sequence::result_type(method, &element, lambda.as_ref().map(|l| &l.ty));
        let lambda = match (method, lambda) {
            (SequenceMethod::Sum, Some(body)) => Some(self.coerce(body, &ty)),
            (_, lambda) => lambda,
        };

        Ok(Expr::new(
            ExprKind::SequenceCall {
                target: Box::new(target),
                method,
                lambda: lambda.map(Box::new),
                arg: arg.map(Box::new),
            },
            ty,
        ))
    }

    /// Lambda body bound in a new frame, with an optional `x =>` range variable
    fn parse_lambda(&mut self, element: &Type) -> CompileResult<Expr> {
        let alias = if self.match_token(&TokenKind::Identifier)
            && self.peek_kind()? == TokenKind::Arrow
        {
            let name = self.advance()?.text;
            self.advance()?;
            Some(name)
        } else {
            None
        };

        self.scope.push(element.clone(), alias);
        let body = self.parse_expression();
        self.scope.pop();
        body
    }

    fn parse_iif(&mut self, offset: usize) -> CompileResult<Expr> {
        let args = self.parse_argument_list()?;
        let [test, if_true, if_false]: [Expr; 3] = args.try_into().map_err(|args: Vec<Expr>| {
            CompileError::from(ParseError::NoApplicableMethod {
                method: "iif".to_string(),
                type_name: self.scope.current_type().to_string(),
                arguments: describe_args(&args),
                offset,
            })
        })?;
        self.bind_conditional(test, if_true, if_false, offset)
    }

    fn parse_new(&mut self) -> CompileResult<Expr> {
        self.expect_token(TokenKind::New)?;
        self.expect_token(TokenKind::LeftParen)?;

        let mut fields: Vec<FieldDef> = vec![];
        let mut values = vec![];
        loop {
            let offset = self.token.offset;
            let value = self.parse_expression()?;
            let name = if self.match_token(&TokenKind::As) {
                self.advance()?;
                self.expect_identifier()?.text
            } else {
                self.inferred_name(&value)
                    .ok_or_else(|| self.unexpected("'as' and a member name"))?
            };
            if fields.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
                return Err(ParseError::DuplicateMemberName { name, offset }.into());
            }
            fields.push(FieldDef {
                name,
                ty: value.ty.clone(),
            });
            values.push(value);

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.expect_token(TokenKind::RightParen)?;

        let class = ClassDef::anonymous(fields);
        let ty = class.ty();
        Ok(Expr::new(
            ExprKind::New {
                class,
                fields: values,
            },
            ty,
        ))
    }

    fn inferred_name(&self, expr: &Expr) -> Option<String> {
        match &expr.kind {
            ExprKind::Member { member, .. } => Some(member.name.clone()),
            ExprKind::Parameter { depth } => self.scope.alias(*depth).map(str::to_string),
            _ => None,
        }
    }

    fn parse_indexer(&mut self, target: Expr) -> CompileResult<Expr> {
        let offset = self.expect_token(TokenKind::LeftBracket)?.offset;
        let index = self.parse_expression()?;
        self.expect_token(TokenKind::RightBracket)?;

        let element = match &target.ty {
            Type::String => Some(Type::String),
            other => other.element_type().cloned(),
        };
        let position = overload::promote(self.resolver, &index, &Type::Int32, false);
        let (Some(element), Some(position)) = (element, position) else {
            return Err(ParseError::NoApplicableIndexer {
                type_name: target.ty.to_string(),
                index_type: index.ty.to_string(),
                offset,
            }
            .into());
        };

        Ok(Expr::new(
            ExprKind::Index {
                target: Box::new(target),
                index: Box::new(position.expr),
            },
            element,
        ))
    }

    fn parse_argument_list(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect_token(TokenKind::LeftParen)?;
        let mut args = vec![];
        if !self.match_token(&TokenKind::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect_token(TokenKind::RightParen)?;
        Ok(args)
    }

    // ---- binding ----

    fn bind_binary(
        &self,
        op: BinaryOperator,
        left: Expr,
        right: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        if op.is_shift() {
            return self.bind_shift(op, left, right, offset);
        }
        if op.is_bitwise() {
            return self.bind_bitwise(op, left, right, offset);
        }
        if op == BinaryOperator::Add && (left.ty == Type::String || right.ty == Type::String) {
            return Ok(Expr::binary(BinaryOperator::Concat, left, right, Type::String));
        }
        self.bind_arithmetic(op, left, right, offset)
    }

    fn bind_arithmetic(
        &self,
        op: BinaryOperator,
        left: Expr,
        right: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        let (left_ty, right_ty) = (left.ty.clone(), right.ty.clone());
        let (left, right) = self.unify(op.as_str(), left, right, offset)?;
        let base = left.ty.non_nullable();
        if !base.is_numeric() {
            return Err(incompatible(op.as_str(), &left_ty, &right_ty, offset));
        }
        let promoted = lift(promote_integral(base), left.ty.is_nullable());
        let left = self.coerce(left, &promoted);
        let right = self.coerce(right, &promoted);
        Ok(Expr::binary(op, left, right, promoted))
    }

    fn bind_bitwise(
        &self,
        op: BinaryOperator,
        left: Expr,
        right: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        let (left_ty, right_ty) = (left.ty.clone(), right.ty.clone());
        let (left, right) = self.unify(op.as_str(), left, right, offset)?;
        let base = left.ty.non_nullable().clone();
        match base {
            Type::Boolean | Type::Enum(_) => {
                let ty = left.ty.clone();
                Ok(Expr::binary(op, left, right, ty))
            }
            ref integral if integral.is_integral() => {
                let promoted = lift(promote_integral(integral), left.ty.is_nullable());
                let left = self.coerce(left, &promoted);
                let right = self.coerce(right, &promoted);
                Ok(Expr::binary(op, left, right, promoted))
            }
            _ => Err(incompatible(op.as_str(), &left_ty, &right_ty, offset)),
        }
    }

    fn bind_shift(
        &self,
        op: BinaryOperator,
        left: Expr,
        right: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        if !left.ty.non_nullable().is_integral() || !right.ty.non_nullable().is_integral() {
            return Err(incompatible(op.as_str(), &left.ty, &right.ty, offset));
        }
        let promoted = lift(promote_integral(left.ty.non_nullable()), left.ty.is_nullable());
        let count = lift(Type::Int32, right.ty.is_nullable());
        let left = self.coerce(left, &promoted);
        let right = self.coerce(right, &count);
        Ok(Expr::binary(op, left, right, promoted))
    }

    fn bind_logical(
        &self,
        op: BinaryOperator,
        left: Expr,
        right: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        if left.ty != Type::Boolean || right.ty != Type::Boolean {
            return Err(incompatible(op.as_str(), &left.ty, &right.ty, offset));
        }
        Ok(Expr::binary(op, left, right, Type::Boolean))
    }

    fn bind_comparison(
        &self,
        op: BinaryOperator,
        left: Expr,
        right: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        if let Some(comparison) = self.resolver.find_comparison(&left.ty, &right.ty) {
            return Ok(Expr::new(
                ExprKind::CustomCompare {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    comparison,
                },
                Type::Boolean,
            ));
        }

        let (left_ty, right_ty) = (left.ty.clone(), right.ty.clone());
        let (left, right) = self.unify(op.as_str(), left, right, offset)?;
        if !op.is_equality() && !left.ty.is_comparable() {
            return Err(incompatible(op.as_str(), &left_ty, &right_ty, offset));
        }
        Ok(Expr::binary(op, left, right, Type::Boolean))
    }

    fn bind_contains(&self, source: Expr, item: Expr, offset: usize) -> CompileResult<Expr> {
        let Some(element) = source.ty.element_type() else {
            return Err(incompatible("in", &item.ty, &source.ty, offset));
        };
        let Some(item) = overload::promote(self.resolver, &item, element, true) else {
            return Err(incompatible("in", &item.ty, &source.ty, offset));
        };
        Ok(Expr::new(
            ExprKind::SequenceCall {
                target: Box::new(source),
                method: SequenceMethod::Contains,
                lambda: None,
                arg: Some(Box::new(item.expr)),
            },
            Type::Boolean,
        ))
    }

    fn bind_conditional(
        &self,
        test: Expr,
        if_true: Expr,
        if_false: Expr,
        offset: usize,
    ) -> CompileResult<Expr> {
        if test.ty != Type::Boolean {
            return Err(type_mismatch(&Type::Boolean.to_string(), &test.ty, offset));
        }
        let (if_true, if_false) = self.unify("?:", if_true, if_false, offset)?;
        let ty = if_true.ty.clone();
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            },
            ty,
        ))
    }

    fn bind_negate(&self, operand: Expr, offset: usize) -> CompileResult<Expr> {
        if let ExprKind::Literal(value) = &operand.kind {
            if let Some(negated) = negate_literal(value) {
                return Ok(Expr::literal(negated));
            }
        }
        let target = match operand.ty.non_nullable() {
            Type::UInt32 => Type::Int64,
            Type::UInt64 => return Err(incompatible_operand("-", &operand.ty, offset)),
            numeric if numeric.is_numeric() => promote_integral(numeric),
            _ => return Err(incompatible_operand("-", &operand.ty, offset)),
        };
        let target = lift(target, operand.ty.is_nullable());
        Ok(Expr::unary(UnaryOperator::Negate, self.coerce(operand, &target)))
    }

    fn bind_not(&self, operand: Expr, offset: usize) -> CompileResult<Expr> {
        let base = operand.ty.non_nullable();
        if *base == Type::Boolean {
            return Ok(Expr::unary(UnaryOperator::Not, operand));
        }
        if !base.is_integral() {
            return Err(incompatible_operand("!", &operand.ty, offset));
        }
        let target = lift(promote_integral(base), operand.ty.is_nullable());
        Ok(Expr::unary(UnaryOperator::Not, self.coerce(operand, &target)))
    }

    fn bind_explicit_conversion(
        &self,
        operand: Expr,
        target: Type,
        offset: usize,
    ) -> CompileResult<Expr> {
        if let Some(promoted) = overload::promote(self.resolver, &operand, &target, true) {
            return Ok(promoted.expr);
        }

        let from = operand.ty.non_nullable();
        let to = target.non_nullable();
        let numeric_like = |ty: &Type| ty.is_numeric() || ty.as_enum().is_some();
        let allowed = (numeric_like(from) && numeric_like(to))
            || *to == Type::String
            || (*from == Type::String && (*to == Type::Guid || numeric_like(to)))
            || *from == Type::Object;
        if !allowed {
            return Err(invalid_conversion(&operand.ty, &target, offset));
        }

        match operand.constant_value().map(|value| value.cast(&target)) {
            Some(Ok(value)) => Ok(operand.with_constant(value, target)),
            Some(Err(_)) => Err(invalid_conversion(&operand.ty, &target, offset)),
            None => Ok(Expr::convert(operand, target, None)),
        }
    }

    /// Bring both operands to one type: constants adapt first, then the cheaper
    /// implicit conversion, then the smallest common numeric type
    fn unify(&self, op: &str, left: Expr, right: Expr, offset: usize) -> CompileResult<(Expr, Expr)> {
        if left.ty == right.ty {
            return Ok((left, right));
        }

        if let Some(value) = right.constant_value() {
            if let Some(coerced) = conversion::coerce_constant(value, &left.ty) {
                let ty = left.ty.clone();
                return Ok((left, right.with_constant(coerced, ty)));
            }
        }
        if let Some(value) = left.constant_value() {
            if let Some(coerced) = conversion::coerce_constant(value, &right.ty) {
                let ty = right.ty.clone();
                return Ok((left.with_constant(coerced, ty), right));
            }
        }

        let to_left = self.operator_conversion(&right.ty, &left.ty);
        let to_right = self.operator_conversion(&left.ty, &right.ty);
        match (to_left, to_right) {
            (Some(a), Some(b)) if b.cost < a.cost => {
                let ty = right.ty.clone();
                Ok((overload::apply_conversion(left, &b, &ty), right))
            }
            (Some(a), _) => {
                let ty = left.ty.clone();
                Ok((left, overload::apply_conversion(right, &a, &ty)))
            }
            (None, Some(b)) => {
                let ty = right.ty.clone();
                Ok((overload::apply_conversion(left, &b, &ty), right))
            }
            (None, None) => match self.common_type(&left.ty, &right.ty) {
                Some(common) => Ok((self.coerce(left, &common), self.coerce(right, &common))),
                None => Err(incompatible(op, &left.ty, &right.ty, offset)),
            },
        }
    }

    /// Implicit conversion usable between operator operands (never to `Object`)
    fn operator_conversion(&self, from: &Type, to: &Type) -> Option<conversion::Conversion> {
        self.resolver
            .implicit_conversion(from, to)
            .filter(|c| c.kind != ConversionKind::ToObject)
    }

    fn common_type(&self, a: &Type, b: &Type) -> Option<Type> {
        let nullable = [a, b]
            .iter()
            .any(|t| t.is_nullable() || **t == Type::Null);
        let mut candidates: Vec<Type> = [a, b]
            .iter()
            .filter(|t| ***t != Type::Null)
            .map(|t| lift(t.non_nullable().clone(), nullable))
            .collect();
        candidates.extend(COMMON_NUMERIC.iter().map(|t| lift(t.clone(), nullable)));

        candidates.into_iter().find(|candidate| {
            self.operator_conversion(a, candidate).is_some()
                && self.operator_conversion(b, candidate).is_some()
        })
    }

    /// Convert an operand whose target type is already decided
    fn coerce(&self, expr: Expr, target: &Type) -> Expr {
        if &expr.ty == target {
            return expr;
        }
        match overload::promote(self.resolver, &expr, target, false) {
            Some(promoted) => promoted.expr,
            None => Expr::convert(expr, target.clone(), None),
        }
    }

    // ---- tokens ----

    fn advance(&mut self) -> CompileResult<Token> {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(std::mem::replace(&mut self.token, next))
    }

    fn peek_kind(&mut self) -> CompileResult<TokenKind> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let kind = token.kind.clone();
        self.peeked = Some(token);
        Ok(kind)
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.token.is(kind)
    }

    fn expect_token(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.match_token(&kind) {
            self.advance()
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn expect_identifier(&mut self) -> CompileResult<Token> {
        self.expect_token(TokenKind::Identifier)
    }

    fn expect_end(&self) -> CompileResult<()> {
        if self.match_token(&TokenKind::End) {
            Ok(())
        } else {
            Err(self.unexpected("operator or end of expression"))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = match self.token.kind {
            TokenKind::End => TokenKind::End.describe().to_string(),
            _ => self.token.text.clone(),
        };
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            offset: self.token.offset,
        }
        .into()
    }
}

fn member_access(target: Expr, member: Member) -> Expr {
    if let MemberKind::Constant(value) = &member.kind {
        return Expr::typed_literal(value.clone(), member.ty.clone());
    }
    let ty = member.ty.clone();
    Expr::new(
        ExprKind::Member {
            target: Box::new(target),
            member,
        },
        ty,
    )
}

/// Narrow integers compute as Int32
fn promote_integral(ty: &Type) -> Type {
    match ty {
        Type::Int8 | Type::Int16 | Type::UInt8 | Type::UInt16 => Type::Int32,
        other => other.clone(),
    }
}

fn lift(ty: Type, nullable: bool) -> Type {
    if nullable {
        Type::nullable(ty)
    } else {
        ty
    }
}

fn negate_literal(value: &Value) -> Option<Value> {
    let negated = match value {
        Value::Int32(v) => Value::Int32(v.wrapping_neg()),
        Value::Int64(v) => Value::Int64(v.wrapping_neg()),
        Value::UInt32(v) if *v == 1 << 31 => Value::Int32(i32::MIN),
        Value::UInt32(v) => Value::Int64(-(*v as i64)),
        Value::UInt64(v) if *v == 1 << 63 => Value::Int64(i64::MIN),
        Value::Float32(v) => Value::Float32(-v),
        Value::Float64(v) => Value::Float64(-v),
        _ => return None,
    };
    Some(negated)
}

fn role_name(role: LambdaRole) -> &'static str {
    match role {
        LambdaRole::Predicate => "Boolean",
        LambdaRole::Numeric => "a numeric type",
        LambdaRole::Comparable => "an ordered type",
        LambdaRole::Projection => "a value",
    }
}

fn describe_args(args: &[Expr]) -> String {
    args.iter()
        .map(|a| a.ty.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn incompatible(op: &str, left: &Type, right: &Type, offset: usize) -> CompileError {
    ParseError::IncompatibleOperands {
        operator: op.to_string(),
        left: left.to_string(),
        right: right.to_string(),
        offset,
    }
    .into()
}

fn incompatible_operand(op: &str, operand: &Type, offset: usize) -> CompileError {
    ParseError::IncompatibleOperand {
        operator: op.to_string(),
        operand: operand.to_string(),
        offset,
    }
    .into()
}

fn invalid_conversion(from: &Type, target: &Type, offset: usize) -> CompileError {
    ParseError::InvalidConversion {
        value: from.to_string(),
        target: target.to_string(),
        offset,
    }
    .into()
}

fn type_mismatch(expected: &str, actual: &Type, offset: usize) -> CompileError {
    ParseError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
        offset,
    }
    .into()
}
