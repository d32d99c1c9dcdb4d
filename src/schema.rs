// Copyright 2025 Oxide Computer Company

//! The schema comparator.
//!
//! Comparison is a pure recursive walk over a pair of schema graphs. Each
//! call resolves both sides (references included), dispatches on structural
//! shape, and returns an owned [`ChangedSchema`], or `None` when the pair
//! carries no reportable difference. Cyclic graphs terminate because the
//! context refuses to re-enter a reference pair already visited on the
//! current path.

use std::ops::Deref;
use std::sync::Arc;

use openapiv3::{
    AdditionalProperties, ArrayType, Discriminator, IntegerType, NumberType, ObjectType,
    ReferenceOr, Schema, SchemaData, SchemaKind, StringType, Type, VariantOrUnknownOrEmpty,
};
use serde::Serialize;

use crate::{
    changed::{Changed, ChangedComposed, ChangedSchema, ElementDiff},
    compare::{Compare, Side},
    context::DiffContext,
    error::DiffError,
    reference::Reference,
    setops::SetCompare,
};

/// Structural kind of a schema, computed once and switched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SchemaShape {
    Array,
    Composed,
    Plain,
}

pub(crate) fn shape(schema: &Schema) -> SchemaShape {
    match &schema.schema_kind {
        SchemaKind::Type(Type::Array(_)) => SchemaShape::Array,
        SchemaKind::OneOf { .. } | SchemaKind::AnyOf { .. } => SchemaShape::Composed,
        _ => SchemaShape::Plain,
    }
}

/// Display label for a schema's type, used in type-changed reports.
pub(crate) fn type_label(schema: &Schema) -> &'static str {
    match &schema.schema_kind {
        SchemaKind::Type(Type::String(_)) => "string",
        SchemaKind::Type(Type::Number(_)) => "number",
        SchemaKind::Type(Type::Integer(_)) => "integer",
        SchemaKind::Type(Type::Boolean(_)) => "boolean",
        SchemaKind::Type(Type::Object(_)) => "object",
        SchemaKind::Type(Type::Array(_)) => "array",
        SchemaKind::OneOf { .. } => "oneOf",
        SchemaKind::AllOf { .. } => "allOf",
        SchemaKind::AnyOf { .. } => "anyOf",
        SchemaKind::Not { .. } => "not",
        SchemaKind::Any(_) => "any",
    }
}

/// A schema with its provenance: either inline content or a shared,
/// identity-cached component.
pub(crate) enum ResolvedSchema<'a> {
    Inline(&'a Schema),
    Shared(Arc<Schema>),
}

impl Deref for ResolvedSchema<'_> {
    type Target = Schema;

    fn deref(&self) -> &Schema {
        match self {
            ResolvedSchema::Inline(schema) => schema,
            ResolvedSchema::Shared(schema) => schema,
        }
    }
}

/// A schema acting as "accepts anything", used when one side of an
/// items/additionalProperties slot is absent.
pub(crate) fn any_schema() -> Schema {
    Schema {
        schema_data: SchemaData::default(),
        schema_kind: SchemaKind::Any(Default::default()),
    }
}

fn format_label<T: Serialize>(format: &VariantOrUnknownOrEmpty<T>) -> Option<String> {
    match format {
        VariantOrUnknownOrEmpty::Item(item) => serde_json::to_value(item)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned)),
        VariantOrUnknownOrEmpty::Unknown(text) => Some(text.clone()),
        VariantOrUnknownOrEmpty::Empty => None,
    }
}

/// Canonical text for enum members, defaults, and other compared values.
/// Strings render bare; everything else renders as JSON text.
fn canonical<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(v) => v.to_string(),
        Err(_) => "null".to_string(),
    }
}

impl Compare<'_> {
    /// Compare two schema references, collapsing "nothing to report" to
    /// `None`.
    pub(crate) fn compare_schema_ref(
        &mut self,
        context: &DiffContext,
        old: &ReferenceOr<Schema>,
        new: &ReferenceOr<Schema>,
    ) -> Result<Option<ChangedSchema>, DiffError> {
        let old = flatten_wrapper(old);
        let new = flatten_wrapper(new);

        let old_ref = reference_id(old);
        let new_ref = reference_id(new);

        // Cycle guard: a reference pair already visited on this path is
        // treated as covered, not an error.
        let context = match context.enter_refs(old_ref, new_ref) {
            Some(context) => context,
            None => return Ok(None),
        };

        let Some(old_schema) = self.resolve_schema(Side::Old, &context, old) else {
            return Ok(None);
        };
        let Some(new_schema) = self.resolve_schema(Side::New, &context, new) else {
            return Ok(None);
        };

        self.compare_schema(&context, &old_schema, &new_schema)
    }

    /// Resolve one side of a comparison. A reference that cannot be resolved
    /// is recorded as a diagnostic and the node is treated as absent.
    fn resolve_schema<'s>(
        &mut self,
        side: Side,
        context: &DiffContext,
        schema_ref: &'s ReferenceOr<Schema>,
    ) -> Option<ResolvedSchema<'s>> {
        match schema_ref {
            ReferenceOr::Item(schema) => Some(ResolvedSchema::Inline(schema)),
            ReferenceOr::Reference { reference } => {
                let location = self.location(side);
                match Reference::parse(reference)
                    .and_then(|r| self.workspace.resolve::<Schema>(location, &r))
                {
                    Ok(schema) => Some(ResolvedSchema::Shared(schema)),
                    Err(err) => {
                        self.diagnose(context, err.to_string());
                        None
                    }
                }
            }
        }
    }

    fn compare_schema(
        &mut self,
        context: &DiffContext,
        old: &Schema,
        new: &Schema,
    ) -> Result<Option<ChangedSchema>, DiffError> {
        let mut changed = ChangedSchema::new(old, new, context.direction, context.pointer.clone());

        // Differing types short-circuit: no structural recursion happens
        // below a type change.
        let (old_label, new_label) = (type_label(old), type_label(new));
        if old_label != new_label {
            changed.type_changed = Some(Changed {
                old: old_label.to_string(),
                new: new_label.to_string(),
            });
            return Ok(changed.into_option());
        }

        compare_schema_data(&mut changed, &old.schema_data, &new.schema_data);

        match (&old.schema_kind, &new.schema_kind) {
            (
                SchemaKind::Type(Type::String(old_string)),
                SchemaKind::Type(Type::String(new_string)),
            ) => {
                compare_string(&mut changed, old_string, new_string);
            }
            (
                SchemaKind::Type(Type::Number(old_number)),
                SchemaKind::Type(Type::Number(new_number)),
            ) => {
                compare_number(&mut changed, old_number, new_number);
            }
            (
                SchemaKind::Type(Type::Integer(old_integer)),
                SchemaKind::Type(Type::Integer(new_integer)),
            ) => {
                compare_integer(&mut changed, old_integer, new_integer);
            }
            (
                SchemaKind::Type(Type::Boolean(old_boolean)),
                SchemaKind::Type(Type::Boolean(new_boolean)),
            ) => {
                changed.constraints_changed |= old_boolean != new_boolean;
            }
            (
                SchemaKind::Type(Type::Object(old_object)),
                SchemaKind::Type(Type::Object(new_object)),
            ) => {
                self.compare_object(&mut changed, context, old_object, new_object)?;
            }
            (
                SchemaKind::Type(Type::Array(old_array)),
                SchemaKind::Type(Type::Array(new_array)),
            ) => {
                self.compare_array(&mut changed, context, old_array, new_array)?;
            }
            (SchemaKind::OneOf { one_of: old_list }, SchemaKind::OneOf { one_of: new_list })
            | (SchemaKind::AnyOf { any_of: old_list }, SchemaKind::AnyOf { any_of: new_list }) => {
                self.compare_composed(&mut changed, context, old, new, old_list, new_list)?;
            }
            // Multi-element allOf would require semantic merging to compare
            // properly; fall back to an equality check.
            (SchemaKind::AllOf { all_of: old_list }, SchemaKind::AllOf { all_of: new_list }) => {
                changed.constraints_changed |= old_list != new_list;
            }
            (SchemaKind::Not { not: old_not }, SchemaKind::Not { not: new_not }) => {
                changed.constraints_changed |= old_not != new_not;
            }
            (SchemaKind::Any(old_any), SchemaKind::Any(new_any)) => {
                changed.constraints_changed |= old_any != new_any;
            }
            _ => unreachable!("type labels matched"),
        }

        Ok(changed.into_option())
    }

    fn compare_object(
        &mut self,
        changed: &mut ChangedSchema,
        context: &DiffContext,
        old_object: &ObjectType,
        new_object: &ObjectType,
    ) -> Result<(), DiffError> {
        let ObjectType {
            properties: old_properties,
            required: old_required,
            additional_properties: old_additional,
            min_properties: old_min_properties,
            max_properties: old_max_properties,
        } = old_object;
        let ObjectType {
            properties: new_properties,
            required: new_required,
            additional_properties: new_additional,
            min_properties: new_min_properties,
            max_properties: new_max_properties,
        } = new_object;

        changed.constraints_changed |= old_min_properties != new_min_properties;
        changed.constraints_changed |= old_max_properties != new_max_properties;

        let mut required = ElementDiff::of(old_required, new_required);

        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(old_properties.iter(), new_properties.iter());

        for (name, (old_prop, new_prop)) in common {
            let child_context = context
                .descend("properties")
                .descend(name)
                .with_required(new_required.contains(name));
            let old_prop = old_prop.clone().unbox();
            let new_prop = new_prop.clone().unbox();
            if let Some(child) = self.compare_schema_ref(&child_context, &old_prop, &new_prop)? {
                changed.changed_properties.insert(name.clone(), child);
            }
        }

        // A property hidden in the current direction was never part of the
        // wire contract here: its removal/addition is suppressed at the
        // point it would be recorded, and any required-set entry for it is
        // retracted along with it.
        for (name, old_prop) in a_unique {
            let prop_context = context.descend("properties").descend(name);
            match self.visible_property(Side::Old, &prop_context, old_prop) {
                Some(schema) => {
                    changed.missing_properties.insert(name.clone(), schema);
                }
                None => {
                    required.missing.retain(|n| n != name);
                    required.increased.retain(|n| n != name);
                }
            }
        }
        for (name, new_prop) in b_unique {
            let prop_context = context.descend("properties").descend(name);
            match self.visible_property(Side::New, &prop_context, new_prop) {
                Some(schema) => {
                    changed.increased_properties.insert(name.clone(), schema);
                }
                None => {
                    required.increased.retain(|n| n != name);
                    required.missing.retain(|n| n != name);
                }
            }
        }

        changed.required = required;

        self.compare_additional_properties(
            changed,
            context,
            old_additional.as_ref(),
            new_additional.as_ref(),
        )?;

        Ok(())
    }

    /// Resolve a one-sided property and apply the visibility filter.
    ///
    /// Returns the resolved schema when the property participates in the
    /// current request/response direction; `None` when it is hidden (or
    /// unresolvable, which also records a diagnostic).
    fn visible_property(
        &mut self,
        side: Side,
        context: &DiffContext,
        prop: &ReferenceOr<Box<Schema>>,
    ) -> Option<Schema> {
        let prop = prop.clone().unbox();
        let resolved = self.resolve_schema(side, context, &prop)?;
        let hidden = (context.is_response() && resolved.schema_data.write_only)
            || (context.is_request() && resolved.schema_data.read_only);
        (!hidden).then(|| (*resolved).clone())
    }

    fn compare_additional_properties(
        &mut self,
        changed: &mut ChangedSchema,
        context: &DiffContext,
        old: Option<&AdditionalProperties>,
        new: Option<&AdditionalProperties>,
    ) -> Result<(), DiffError> {
        // Absent is equivalent to `true` (anything goes).
        let normalize = |ap: Option<&AdditionalProperties>| match ap {
            None | Some(AdditionalProperties::Any(true)) => ApSlot::Permissive,
            Some(AdditionalProperties::Any(false)) => ApSlot::Forbidden,
            Some(AdditionalProperties::Schema(schema)) => ApSlot::Schema((**schema).clone()),
        };

        let context = context.descend("additionalProperties");
        let (old_slot, new_slot) = (normalize(old), normalize(new));

        let node = match (old_slot, new_slot) {
            (ApSlot::Permissive, ApSlot::Permissive) | (ApSlot::Forbidden, ApSlot::Forbidden) => {
                None
            }
            // If either side constrains extra properties, recurse; the
            // other side diffs as the implicit "anything" schema.
            (old_slot, new_slot) => {
                let old_schema = old_slot.into_schema_ref();
                let new_schema = new_slot.into_schema_ref();
                self.compare_schema_ref(&context, &old_schema, &new_schema)?
            }
        };
        changed.additional_properties = node.map(Box::new);
        Ok(())
    }

    fn compare_array(
        &mut self,
        changed: &mut ChangedSchema,
        context: &DiffContext,
        old_array: &ArrayType,
        new_array: &ArrayType,
    ) -> Result<(), DiffError> {
        let ArrayType {
            items: old_items,
            min_items: old_min_items,
            max_items: old_max_items,
            unique_items: old_unique_items,
        } = old_array;
        let ArrayType {
            items: new_items,
            min_items: new_min_items,
            max_items: new_max_items,
            unique_items: new_unique_items,
        } = new_array;

        changed.constraints_changed |= old_min_items != new_min_items;
        changed.constraints_changed |= old_max_items != new_max_items;
        changed.constraints_changed |= old_unique_items != new_unique_items;

        // Absent items means "anything".
        let old_items = old_items
            .clone()
            .map(ReferenceOr::unbox)
            .unwrap_or_else(|| ReferenceOr::Item(any_schema()));
        let new_items = new_items
            .clone()
            .map(ReferenceOr::unbox)
            .unwrap_or_else(|| ReferenceOr::Item(any_schema()));

        let items_context = context.descend("items");
        changed.items = self
            .compare_schema_ref(&items_context, &old_items, &new_items)?
            .map(Box::new);
        Ok(())
    }

    /// Compare two discriminated composed schemas by their discriminator
    /// mappings.
    fn compare_composed(
        &mut self,
        changed: &mut ChangedSchema,
        context: &DiffContext,
        old: &Schema,
        new: &Schema,
        old_list: &[ReferenceOr<Schema>],
        new_list: &[ReferenceOr<Schema>],
    ) -> Result<(), DiffError> {
        // A composed schema without a discriminator property is
        // unprocessable input, not a reportable difference.
        let old_disc = usable_discriminator(&old.schema_data, context)?;
        let new_disc = usable_discriminator(&new.schema_data, context)?;

        if old_disc.property_name != new_disc.property_name
            || old_list.is_empty()
            || new_list.is_empty()
        {
            changed.discriminator_changed = true;
            return Ok(());
        }

        let members_context = context.descend("oneOf");
        let old_mapping = self.discriminator_mapping(&members_context, old_list, old_disc);
        let new_mapping = self.discriminator_mapping(&members_context, new_list, new_disc);

        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(old_mapping, new_mapping);

        let mut composed = ChangedComposed {
            increased: b_unique.into_iter().map(|(value, _)| value).collect(),
            missing: a_unique.into_iter().map(|(value, _)| value).collect(),
            ..Default::default()
        };

        for (value, (old_member, new_member)) in common {
            let member_context = members_context.descend(&value);
            if let Some(child) = self.compare_schema_ref(&member_context, &old_member, &new_member)?
            {
                composed.changed.insert(value, child);
            }
        }

        changed.one_of = composed.into_option();
        Ok(())
    }

    /// Build the reverse mapping `discriminator value -> member schema`.
    ///
    /// Each referenced member defaults to its schema name as the value;
    /// explicit mapping entries override the value for the schema they
    /// target (and introduce entries for schemas outside the member list).
    /// A member or mapping entry with no derivable schema name is skipped
    /// with a diagnostic.
    fn discriminator_mapping(
        &mut self,
        context: &DiffContext,
        members: &[ReferenceOr<Schema>],
        discriminator: &Discriminator,
    ) -> Vec<(String, ReferenceOr<Schema>)> {
        // Schema name -> (discriminator value, member), in member order.
        let mut by_name: Vec<(String, (String, ReferenceOr<Schema>))> = Vec::new();
        for member in members {
            match member {
                ReferenceOr::Reference { reference } => match Reference::parse(reference) {
                    Ok(parsed) => {
                        by_name.push((parsed.id.clone(), (parsed.id, member.clone())));
                    }
                    Err(_) => {
                        self.diagnose(
                            context,
                            format!("cannot derive a schema name from oneOf member {reference:?}"),
                        );
                    }
                },
                ReferenceOr::Item(_) => {
                    self.diagnose(context, "inline oneOf member has no schema name; skipping");
                }
            }
        }

        let mut extras: Vec<(String, ReferenceOr<Schema>)> = Vec::new();
        for (value, target) in &discriminator.mapping {
            let reference = if target.contains('#') {
                target.clone()
            } else {
                Reference::schema(target).to_string()
            };
            let Ok(parsed) = Reference::parse(&reference) else {
                self.diagnose(
                    context,
                    format!(
                        "discriminator mapping {value:?} -> {target:?} is not resolvable; skipping"
                    ),
                );
                continue;
            };
            match by_name.iter_mut().find(|(name, _)| *name == parsed.id) {
                Some((_, entry)) => entry.0 = value.clone(),
                None => extras.push((value.clone(), ReferenceOr::Reference { reference })),
            }
        }

        by_name
            .into_iter()
            .map(|(_, entry)| entry)
            .chain(extras)
            .collect()
    }
}

/// Peel single-element `allOf`/`anyOf`/`oneOf` wrappers: they are
/// semantically equivalent to their inner type. A wrapper is commonly added
/// to attach a description to a `$ref`.
fn flatten_wrapper(mut schema_ref: &ReferenceOr<Schema>) -> &ReferenceOr<Schema> {
    loop {
        let ReferenceOr::Item(schema) = schema_ref else {
            return schema_ref;
        };
        if schema.schema_data.discriminator.is_some() {
            return schema_ref;
        }
        schema_ref = match &schema.schema_kind {
            SchemaKind::AllOf { all_of } if all_of.len() == 1 => &all_of[0],
            SchemaKind::AnyOf { any_of } if any_of.len() == 1 => &any_of[0],
            SchemaKind::OneOf { one_of } if one_of.len() == 1 => &one_of[0],
            _ => return schema_ref,
        };
    }
}

/// Attribute diffs that apply regardless of structural kind.
fn compare_schema_data(changed: &mut ChangedSchema, old: &SchemaData, new: &SchemaData) {
    // Deprecation is only reported when introduced; reverting it restores
    // the status quo.
    changed.deprecated = !old.deprecated && new.deprecated;

    changed.title = Changed::of(&old.title, &new.title);
    changed.description = Changed::of(&old.description, &new.description);
    changed.read_only = Changed::of(&old.read_only, &new.read_only);
    changed.write_only = Changed::of(&old.write_only, &new.write_only);

    let old_default = old.default.as_ref().map(canonical);
    let new_default = new.default.as_ref().map(canonical);
    changed.default = Changed::of(&old_default, &new_default);

    changed.extensions_changed = old.extensions != new.extensions;
    changed.constraints_changed |= old.nullable != new.nullable;

    // Composed comparison owns the discriminator; anywhere else a
    // discriminator difference is a rename.
    let composed = shape(&changed.old) == SchemaShape::Composed
        || shape(&changed.new) == SchemaShape::Composed;
    if !composed && old.discriminator != new.discriminator {
        changed.discriminator_changed = true;
    }
}

/// Normalized additional-properties slot.
enum ApSlot {
    Permissive,
    Forbidden,
    Schema(ReferenceOr<Schema>),
}

impl ApSlot {
    fn into_schema_ref(self) -> ReferenceOr<Schema> {
        match self {
            ApSlot::Schema(schema) => schema,
            ApSlot::Permissive => ReferenceOr::Item(any_schema()),
            ApSlot::Forbidden => {
                let mut schema = any_schema();
                schema.schema_data.title = Some("no additional properties".to_string());
                ReferenceOr::Item(schema)
            }
        }
    }
}

fn reference_id(schema_ref: &ReferenceOr<Schema>) -> Option<&str> {
    match schema_ref {
        ReferenceOr::Reference { reference } => Some(reference.as_str()),
        ReferenceOr::Item(_) => None,
    }
}

fn usable_discriminator<'s>(
    data: &'s SchemaData,
    context: &DiffContext,
) -> Result<&'s Discriminator, DiffError> {
    match &data.discriminator {
        Some(discriminator) if !discriminator.property_name.is_empty() => Ok(discriminator),
        _ => Err(DiffError::MalformedDiscriminator {
            pointer: context.pointer.to_string(),
        }),
    }
}

fn compare_string(changed: &mut ChangedSchema, old: &StringType, new: &StringType) {
    let StringType {
        format: old_format,
        pattern: old_pattern,
        enumeration: old_enumeration,
        min_length: old_min_length,
        max_length: old_max_length,
    } = old;
    let StringType {
        format: new_format,
        pattern: new_pattern,
        enumeration: new_enumeration,
        min_length: new_min_length,
        max_length: new_max_length,
    } = new;

    changed.format = Changed::of(&format_label(old_format), &format_label(new_format));
    changed.max_length = Changed::of(old_max_length, new_max_length);
    changed.enumeration = enumeration_diff(old_enumeration, new_enumeration);
    changed.constraints_changed |= old_pattern != new_pattern;
    changed.constraints_changed |= old_min_length != new_min_length;
}

fn compare_number(changed: &mut ChangedSchema, old: &NumberType, new: &NumberType) {
    let NumberType {
        format: old_format,
        multiple_of: old_multiple_of,
        exclusive_minimum: old_exclusive_minimum,
        exclusive_maximum: old_exclusive_maximum,
        minimum: old_minimum,
        maximum: old_maximum,
        enumeration: old_enumeration,
    } = old;
    let NumberType {
        format: new_format,
        multiple_of: new_multiple_of,
        exclusive_minimum: new_exclusive_minimum,
        exclusive_maximum: new_exclusive_maximum,
        minimum: new_minimum,
        maximum: new_maximum,
        enumeration: new_enumeration,
    } = new;

    changed.format = Changed::of(&format_label(old_format), &format_label(new_format));
    changed.enumeration = enumeration_diff(old_enumeration, new_enumeration);
    changed.constraints_changed |= old_multiple_of != new_multiple_of
        || old_exclusive_minimum != new_exclusive_minimum
        || old_exclusive_maximum != new_exclusive_maximum
        || old_minimum != new_minimum
        || old_maximum != new_maximum;
}

fn compare_integer(changed: &mut ChangedSchema, old: &IntegerType, new: &IntegerType) {
    let IntegerType {
        format: old_format,
        multiple_of: old_multiple_of,
        exclusive_minimum: old_exclusive_minimum,
        exclusive_maximum: old_exclusive_maximum,
        minimum: old_minimum,
        maximum: old_maximum,
        enumeration: old_enumeration,
    } = old;
    let IntegerType {
        format: new_format,
        multiple_of: new_multiple_of,
        exclusive_minimum: new_exclusive_minimum,
        exclusive_maximum: new_exclusive_maximum,
        minimum: new_minimum,
        maximum: new_maximum,
        enumeration: new_enumeration,
    } = new;

    changed.format = Changed::of(&format_label(old_format), &format_label(new_format));
    changed.enumeration = enumeration_diff(old_enumeration, new_enumeration);
    changed.constraints_changed |= old_multiple_of != new_multiple_of
        || old_exclusive_minimum != new_exclusive_minimum
        || old_exclusive_maximum != new_exclusive_maximum
        || old_minimum != new_minimum
        || old_maximum != new_maximum;
}

/// Set-difference two enum lists on canonical value text.
fn enumeration_diff<T: Serialize>(old: &[Option<T>], new: &[Option<T>]) -> ElementDiff<String> {
    let render = |values: &[Option<T>]| -> Vec<String> {
        values
            .iter()
            .map(|v| match v {
                Some(v) => canonical(v),
                None => "null".to_string(),
            })
            .collect()
    };
    ElementDiff::of(&render(old), &render(new))
}
