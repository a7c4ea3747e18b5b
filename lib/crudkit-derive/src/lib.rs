use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Lit, parse_macro_input};

/// Check if a field has a specific attribute
fn has_attr(field: &syn::Field, attr_name: &str) -> bool {
    field
        .attrs
        .iter()
        .any(|attr| attr.path().is_ident(attr_name))
}

/// Options from `#[column(...)]`.
#[derive(Default)]
struct ColumnOpts {
    name: Option<String>,
    skip: bool,
    default_now: bool,
}

fn parse_column_opts(field: &syn::Field) -> syn::Result<ColumnOpts> {
    let mut opts = ColumnOpts::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                opts.skip = true;
            } else if meta.path.is_ident("default_now") {
                opts.default_now = true;
            } else if meta.path.is_ident("name") {
                meta.input.parse::<syn::Token![=]>()?;
                match meta.input.parse::<Lit>()? {
                    Lit::Str(s) => opts.name = Some(s.value()),
                    other => return Err(syn::Error::new_spanned(other, "expected a string")),
                }
            } else {
                return Err(meta.error("expected `name = \"...\"`, `skip` or `default_now`"));
            }
            Ok(())
        })?;
    }
    Ok(opts)
}

/// Parse `#[entity(table = "...")]`
fn parse_table_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                meta.input.parse::<syn::Token![=]>()?;
                if let Lit::Str(s) = meta.input.parse::<Lit>()? {
                    table_name = Some(s.value());
                    return Ok(());
                }
            }
            Err(meta.error("expected `table = \"...\"`"))
        })?;
    }
    Ok(table_name)
}

/// Convert CamelCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

enum SqlType {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
}

impl SqlType {
    fn tokens(&self) -> TokenStream2 {
        match self {
            SqlType::Integer => quote! { ::crudkit::FieldType::Integer },
            SqlType::Float => quote! { ::crudkit::FieldType::Float },
            SqlType::Boolean => quote! { ::crudkit::FieldType::Boolean },
            SqlType::Text => quote! { ::crudkit::FieldType::Text },
            SqlType::Timestamp => quote! { ::crudkit::FieldType::Timestamp },
        }
    }
}

const OPTION_PATHS: &[&str] = &[
    "::std::option::",
    "std::option::",
    "::core::option::",
    "core::option::",
];

/// Inner type of `Option<T>`, however the path to `Option` is written.
fn option_inner(type_str: &str) -> Option<&str> {
    let unqualified = OPTION_PATHS
        .iter()
        .find_map(|prefix| type_str.strip_prefix(prefix))
        .unwrap_or(type_str);
    unqualified.strip_prefix("Option<")?.strip_suffix('>')
}

/// Map a Rust type to its column type and nullability
fn rust_type_to_sql_type(ty: &syn::Type) -> syn::Result<(SqlType, bool)> {
    let type_str = quote!(#ty).to_string();
    // Remove spaces for easier matching
    let type_str = type_str.replace(' ', "");

    let (inner_type, nullable) = match option_inner(&type_str) {
        Some(inner) => (inner, true),
        None => (type_str.as_str(), false),
    };
    if inner_type.contains("DateTime<") {
        return Err(syn::Error::new_spanned(
            ty,
            "timestamp fields must be chrono::NaiveDateTime holding UTC",
        ));
    }
    let inner_type = inner_type.rsplit("::").next().unwrap_or(inner_type);

    let sql_type = match inner_type {
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "isize" | "usize" => {
            SqlType::Integer
        }
        "f32" | "f64" => SqlType::Float,
        "bool" => SqlType::Boolean,
        "NaiveDateTime" => SqlType::Timestamp,
        // Default to text for String and everything else
        _ => SqlType::Text,
    };
    Ok((sql_type, nullable))
}

/// Derive macro for the `Entity` trait.
///
/// Describes a struct's table, columns, and identifying key so the generic
/// repository can query and cast filters for it.
///
/// ## Attributes
///
/// - `#[entity(table = "...")]` on the struct. Defaults to the snake_case
///   struct name.
/// - `#[key]` marks the identifying key. Without it a field named `id` is
///   used. An integer key is generated by the backend on insert.
/// - `#[column(name = "...")]` stores the field under a different column.
/// - `#[column(skip)]` leaves the field out entirely; pair it with
///   `#[serde(default)]`.
/// - `#[column(default_now)]` fills the column with the insert time when the
///   payload omits it.
///
/// `Option<_>` fields are nullable. Integer, float and `bool` fields map to
/// their column types, `NaiveDateTime` to a timestamp, anything else to text.
///
/// ## Example
///
/// ```text
/// #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
/// #[entity(table = "samples")]
/// struct Sample {
///     pub id: i64,
///     pub name: String,
///     pub description: Option<String>,
///     #[column(default_now)]
///     pub created_at: NaiveDateTime,
///     pub deleted_at: Option<NaiveDateTime>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity, key, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Entity only supports structs")),
    };

    let table_name =
        parse_table_name(input)?.unwrap_or_else(|| to_snake_case(&name.to_string()));
    let entity_name = name.to_string();

    let marked: Vec<_> = fields.iter().filter(|f| has_attr(f, "key")).collect();
    if marked.len() > 1 {
        return Err(syn::Error::new_spanned(
            marked[1],
            "only one field may be marked #[key]",
        ));
    }

    let mut key_column = None;
    let mut field_tokens = Vec::new();

    for field in fields.iter() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let opts = parse_column_opts(field)?;
        let is_key = if marked.is_empty() {
            ident == "id"
        } else {
            has_attr(field, "key")
        };

        if opts.skip {
            if is_key {
                return Err(syn::Error::new_spanned(field, "the key field cannot be skipped"));
            }
            continue;
        }

        let attr = ident.to_string();
        let column = opts.name.unwrap_or_else(|| attr.clone());
        let (sql_type, nullable) = rust_type_to_sql_type(&field.ty)?;

        let mut generated = quote! {};
        if opts.default_now {
            if !matches!(sql_type, SqlType::Timestamp) {
                return Err(syn::Error::new_spanned(
                    field,
                    "#[column(default_now)] requires a NaiveDateTime field",
                ));
            }
            generated = quote! { .generated(::crudkit::Generated::Now) };
        } else if is_key && matches!(sql_type, SqlType::Integer) {
            generated = quote! { .generated(::crudkit::Generated::AutoIncrement) };
        }

        let nullable = if nullable {
            quote! { .nullable() }
        } else {
            quote! {}
        };
        let field_type = sql_type.tokens();

        field_tokens.push(quote! {
            ::crudkit::Field::new(#column, #field_type).attr(#attr) #nullable #generated
        });

        if is_key {
            key_column = Some(column);
        }
    }

    let Some(key_column) = key_column else {
        return Err(syn::Error::new_spanned(
            name,
            "Entity requires a field named `id` or a field marked #[key]",
        ));
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::crudkit::Entity for #name #ty_generics #where_clause {
            fn table_name() -> &'static str {
                #table_name
            }

            fn entity_name() -> &'static str {
                #entity_name
            }

            fn fields() -> &'static [::crudkit::Field] {
                const FIELDS: &[::crudkit::Field] = &[#(#field_tokens),*];
                FIELDS
            }

            fn key_field() -> &'static str {
                #key_column
            }
        }
    })
}
