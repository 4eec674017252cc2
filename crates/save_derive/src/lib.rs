//! `#[derive(SaveFields)]`: describes a struct's fields to the save field
//! engine.
//!
//! # Usage
//!
//! ```ignore
//! #[derive(SaveFields)]
//! #[save(exclude = "cached_path")]
//! struct Door {
//!     open: bool,
//!     #[save(reference)]
//!     lever: ObjectHandle<Lever>,
//!     #[save(collection)]
//!     visitors: Vec<String>,
//!     #[save(skip)]
//!     cached_path: Vec<Vec3>,
//!     on_open: Option<Box<dyn Fn() + Send + Sync>>,
//! }
//! ```
//!
//! Field attributes: `skip`, `read_only`, `delegate`, `reference`,
//! `collection`. Fields whose type is a bare `fn` or contains a `dyn Fn*`
//! trait object are treated as delegates without an attribute. Skipped,
//! read-only and delegate fields do not need to implement `Describe`.
//!
//! The generated code refers to the runtime crate as `::save`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, Index,
    LitStr, PathArguments, Type, TypeParamBound,
};

#[derive(Default)]
struct FieldFlags {
    skip: bool,
    read_only: bool,
    delegate: bool,
    reference: bool,
    collection: bool,
}

impl FieldFlags {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut flags = FieldFlags::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("save")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    flags.skip = true;
                } else if meta.path.is_ident("read_only") {
                    flags.read_only = true;
                } else if meta.path.is_ident("delegate") {
                    flags.delegate = true;
                } else if meta.path.is_ident("reference") {
                    flags.reference = true;
                } else if meta.path.is_ident("collection") {
                    flags.collection = true;
                } else {
                    return Err(meta.error(
                        "expected one of `skip`, `read_only`, `delegate`, `reference`, `collection`",
                    ));
                }
                Ok(())
            })?;
        }
        Ok(flags)
    }

    /// Excluded fields get no accessors and no type description.
    fn is_opaque(&self) -> bool {
        self.skip || self.read_only || self.delegate
    }
}

fn struct_excludes(attrs: &[Attribute]) -> syn::Result<Vec<LitStr>> {
    let mut excludes = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("save")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("exclude") {
                let name: LitStr = meta.value()?.parse()?;
                excludes.push(name);
                Ok(())
            } else {
                Err(meta.error("expected `exclude = \"field\"`"))
            }
        })?;
    }
    Ok(excludes)
}

fn is_fn_bound(bound: &TypeParamBound) -> bool {
    match bound {
        TypeParamBound::Trait(t) => t
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "Fn" || s.ident == "FnMut" || s.ident == "FnOnce"),
        _ => false,
    }
}

/// Bare `fn` pointers and anything wrapping a `dyn Fn*` trait object.
fn is_delegate_type(ty: &Type) -> bool {
    match ty {
        Type::BareFn(_) => true,
        Type::TraitObject(t) => t.bounds.iter().any(is_fn_bound),
        Type::Paren(p) => is_delegate_type(&p.elem),
        Type::Group(g) => is_delegate_type(&g.elem),
        Type::Reference(r) => is_delegate_type(&r.elem),
        Type::Path(p) => p.path.segments.iter().any(|seg| match &seg.arguments {
            PathArguments::AngleBracketed(args) => args.args.iter().any(|arg| match arg {
                GenericArgument::Type(t) => is_delegate_type(t),
                _ => false,
            }),
            _ => false,
        }),
        _ => false,
    }
}

struct FieldItem {
    name: String,
    member: TokenStream2,
    ty: Type,
    flags: FieldFlags,
}

fn collect_fields(fields: &Fields) -> syn::Result<Vec<FieldItem>> {
    let mut out = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        let mut flags = FieldFlags::parse(&field.attrs)?;
        if is_delegate_type(&field.ty) {
            flags.delegate = true;
        }
        let (name, member) = match &field.ident {
            Some(ident) => (ident.to_string(), quote!(#ident)),
            None => {
                let index = Index::from(i);
                (i.to_string(), quote!(#index))
            }
        };
        out.push(FieldItem {
            name,
            member,
            ty: field.ty.clone(),
            flags,
        });
    }
    Ok(out)
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "SaveFields cannot be derived for generic structs",
        ));
    }
    let fields = match &input.data {
        Data::Struct(s) => collect_fields(&s.fields)?,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "SaveFields can only be derived for structs",
            ))
        }
    };
    let excludes = struct_excludes(&input.attrs)?;

    let mut accessors = Vec::new();
    let mut descriptors = Vec::new();
    for field in &fields {
        let FieldItem {
            name: field_name,
            member,
            ty,
            flags,
        } = field;
        let FieldFlags {
            skip,
            read_only,
            delegate,
            reference,
            collection,
        } = *flags;
        let attrs = quote! {
            ::save::FieldAttrs {
                skip: #skip,
                read_only: #read_only,
                delegate: #delegate,
                reference: #reference,
                collection: #collection,
            }
        };

        if flags.is_opaque() {
            descriptors.push(quote! {
                ::save::FieldDescriptor {
                    name: #field_name,
                    type_info: ::std::option::Option::None,
                    attrs: #attrs,
                    access: ::std::option::Option::None,
                }
            });
            continue;
        }

        let get = format_ident!("__save_get_{}", field_name);
        let get_mut = format_ident!("__save_get_mut_{}", field_name);
        accessors.push(quote! {
            fn #get(s: &#name) -> &dyn ::std::any::Any {
                &s.#member
            }
            fn #get_mut(s: &mut #name) -> &mut dyn ::std::any::Any {
                &mut s.#member
            }
        });
        descriptors.push(quote! {
            ::save::FieldDescriptor {
                name: #field_name,
                type_info: ::std::option::Option::Some(
                    <#ty as ::save::Describe>::type_info as fn() -> ::save::TypeInfo,
                ),
                attrs: #attrs,
                access: ::std::option::Option::Some(::save::FieldAccess {
                    get: #get,
                    get_mut: #get_mut,
                }),
            }
        });
    }

    Ok(quote! {
        impl ::save::SaveFields for #name {
            #[allow(non_snake_case)]
            fn field_descriptors() -> ::std::vec::Vec<::save::FieldDescriptor<Self>> {
                #(#accessors)*
                ::std::vec![#(#descriptors),*]
            }

            fn excluded_backing_fields() -> &'static [&'static str] {
                &[#(#excludes),*]
            }
        }
    })
}

/// `#[derive(SaveFields)]`, see the crate docs for the accepted attributes.
#[proc_macro_derive(SaveFields, attributes(save))]
pub fn derive_save_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
