use std::io::Write;
use std::sync::Arc;

use curly::{Call, Op, Template};
use log::debug;

use crate::cache::{FragmentCache, PlanCache};
use crate::error::RenderError;
use crate::presenter::{Bindings, Presenter};
use crate::registry::PresenterRegistry;
use crate::value::Value;

/// Evaluate a compiled template against `presenter`, writing to `output`.
///
/// Call results are written as-is; presenters are responsible for
/// returning text that is safe for the output format.
pub fn render(
    template: &Template,
    presenter: &dyn Presenter,
    bindings: &Bindings,
    registry: &PresenterRegistry,
    output: &mut dyn Write,
) -> Result<(), RenderError> {
    let ops = template.ops();
    execute_ops(ops, 0, ops.len(), presenter, bindings, registry, output)
}

pub fn render_to_string(
    template: &Template,
    presenter: &dyn Presenter,
    bindings: &Bindings,
    registry: &PresenterRegistry,
) -> Result<String, RenderError> {
    let mut buffer = Vec::new();
    render(template, presenter, bindings, registry, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| RenderError::Custom(format!("invalid UTF-8 output: {}", e)))
}

/// Execute `ops[start..end]`. Recursion follows block nesting, which the
/// compiler caps at [`curly::MAX_NESTING_DEPTH`].
fn execute_ops(
    ops: &[Op],
    start: usize,
    end: usize,
    presenter: &dyn Presenter,
    bindings: &Bindings,
    registry: &PresenterRegistry,
    output: &mut dyn Write,
) -> Result<(), RenderError> {
    let mut pc = start;
    while pc < end {
        match &ops[pc] {
            Op::Text(text) => {
                output.write_all(text.as_bytes())?;
                pc += 1;
            }
            Op::Emit(call) => {
                write!(output, "{}", invoke(presenter, call)?)?;
                pc += 1;
            }
            Op::Conditional {
                call,
                negated,
                end: block_end,
            } => {
                if invoke(presenter, call)?.is_truthy() != *negated {
                    execute_ops(ops, pc + 1, *block_end, presenter, bindings, registry, output)?;
                }
                pc = *block_end;
            }
            Op::Collection {
                call,
                scope,
                end: block_end,
            } => {
                let items = invoke(presenter, call)?.into_items();
                for (i, item) in items.into_iter().enumerate() {
                    let (nested, nested_bindings) =
                        registry.instantiate_nested_presenter(scope, item, i + 1, bindings)?;
                    execute_ops(
                        ops,
                        pc + 1,
                        *block_end,
                        nested.as_ref(),
                        &nested_bindings,
                        registry,
                        output,
                    )?;
                }
                pc = *block_end;
            }
        }
    }
    Ok(())
}

fn invoke(presenter: &dyn Presenter, call: &Call) -> Result<Value, RenderError> {
    presenter.call(&call.method, call.identifier.as_deref(), &call.attributes)
}

/// The whole host pipeline: look up a presenter type, compile (cached),
/// instantiate, run `setup`, consult the fragment cache and render.
pub struct Renderer {
    registry: PresenterRegistry,
    plans: PlanCache,
    fragments: Option<Arc<dyn FragmentCache>>,
}

impl Renderer {
    pub fn new(registry: PresenterRegistry) -> Self {
        Renderer {
            registry,
            plans: PlanCache::new(),
            fragments: None,
        }
    }

    pub fn with_fragment_cache(mut self, cache: Arc<dyn FragmentCache>) -> Self {
        self.fragments = Some(cache);
        self
    }

    pub fn registry(&self) -> &PresenterRegistry {
        &self.registry
    }

    pub fn plans(&self) -> &PlanCache {
        &self.plans
    }

    /// Compile `source` for presenter type `presenter`, reusing an earlier
    /// compile of the same pair.
    pub fn compile(&self, presenter: &str, source: &str) -> Result<Arc<Template>, RenderError> {
        let contract = self
            .registry
            .contract(presenter)
            .ok_or_else(|| RenderError::UnknownPresenter(presenter.to_string()))?;
        Ok(self.plans.get_or_compile(source, &contract, &self.registry)?)
    }

    pub fn render_named(
        &self,
        presenter: &str,
        source: &str,
        bindings: &Bindings,
    ) -> Result<String, RenderError> {
        let template = self.compile(presenter, source)?;
        let mut instance = self.registry.instantiate(presenter, bindings)?;
        instance.setup()?;

        let cache_key = instance.cache_key().map(|key| format!("{}/{}", presenter, key));
        if let (Some(fragments), Some(key)) = (&self.fragments, &cache_key) {
            if let Some(hit) = fragments.fetch(key) {
                debug!("fragment cache hit for `{}`", key);
                return Ok(hit);
            }
            debug!("fragment cache miss for `{}`", key);
        }

        let output = render_to_string(&template, instance.as_ref(), bindings, &self.registry)?;

        if let (Some(fragments), Some(key)) = (&self.fragments, &cache_key) {
            fragments.store(key, output.clone(), instance.cache_duration());
        }
        Ok(output)
    }
}
