use crate::core::{Arity, Operation};
use serde::{Deserialize, Serialize};

/// Schema for a configurable option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub default: serde_json::Value,
    /// Whether the option is cleared when the input shape changes
    #[serde(default)]
    pub shape_dependent: bool,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, default: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            default,
            shape_dependent: false,
        }
    }

    pub fn shape_dependent(mut self) -> Self {
        self.shape_dependent = true;
        self
    }
}

/// Factory function type for creating operation instances
pub type OperationFactory = fn() -> Box<dyn Operation>;

/// Complete metadata for an operation type
#[derive(Clone)]
pub struct OperationMetadata {
    pub id: String,
    pub name: String,
    pub category: String,
    pub inputs: Arity,
    pub outputs: Arity,
    pub parameters: Vec<ParameterSchema>,
    pub factory: OperationFactory,
}

impl OperationMetadata {
    /// Arity is taken from a default-constructed instance
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        factory: OperationFactory,
    ) -> Self {
        let sample = factory();
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            inputs: sample.inputs(),
            outputs: sample.outputs(),
            parameters: Vec::new(),
            factory,
        }
    }

    pub fn add_parameter(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    /// Create a new instance of this operation type
    pub fn create_instance(&self) -> Box<dyn Operation> {
        (self.factory)()
    }
}

impl std::fmt::Debug for OperationMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationMetadata")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("parameters", &self.parameters)
            .finish()
    }
}

// Factory type for creating operation metadata at runtime
pub type OperationMetadataFactory = fn() -> OperationMetadata;

// Wrapper for inventory collection
pub struct OperationMetadataFactoryWrapper(pub OperationMetadataFactory);

// Inventory submission type
inventory::collect!(OperationMetadataFactoryWrapper);
