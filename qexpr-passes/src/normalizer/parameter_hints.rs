use qexpr_ast::{Expr, MethodCall, PARAMETER_HINT_METHODS, ParameterTranslationMode};
use qexpr_errors::{QexprError, QexprResult, internal};
use tracing::trace;

use super::QueryableMethodNormalizer;

/// If `call` is a parameter translation hint, returns the translation mode it asks for
pub(super) fn translation_mode(call: &MethodCall) -> Option<ParameterTranslationMode> {
    let hints = &*PARAMETER_HINT_METHODS;
    if call.is(&hints.constant) {
        Some(ParameterTranslationMode::Constant)
    } else if call.is(&hints.parameter) {
        Some(ParameterTranslationMode::Parameter)
    } else if call.is(&hints.multiple_parameters) {
        Some(ParameterTranslationMode::MultipleParameters)
    } else {
        None
    }
}

impl QueryableMethodNormalizer<'_> {
    /// Replace a parameter hint such as `EF.Constant(@p)` with the query parameter it wraps,
    /// marked with the requested translation mode
    pub(super) fn apply_parameter_hint(
        &mut self,
        mode: ParameterTranslationMode,
        call: MethodCall,
    ) -> QexprResult<Expr> {
        if mode == ParameterTranslationMode::Constant && !self.params.supports_constant_parameters
        {
            return Err(QexprError::UnsupportedConstantCapability);
        }

        let MethodCall {
            method, arguments, ..
        } = call;
        let Some(argument) = arguments.into_iter().next() else {
            internal!("{method} called without an argument");
        };
        match self.visit(argument)? {
            Expr::QueryParameter(parameter) => {
                trace!(parameter = %parameter.name, ?mode, "Applying parameter hint");
                Ok(parameter.with_translation_mode(mode).into())
            }
            argument => internal!("Expected a query parameter as argument to {method}, got {argument}"),
        }
    }
}
