use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, GenericArgument, PathArguments, Type, parse_macro_input, spanned::Spanned};

/// Derives `FooHandle` for `enum FooEvent`.
///
/// Every variant becomes an async method sending that variant over the
/// handle's `mpsc::Sender`. A named variant with a `reply: oneshot::Sender<T>`
/// field is a request: the method takes every other field, creates the
/// channel itself and resolves to `Result<T>` once the actor answers.
///
/// The generated code uses whatever `Result` is in scope at the derive site,
/// its error type must convert from the mpsc send error and the oneshot
/// receive error.
#[proc_macro_derive(Handle)]
pub fn handle(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let enum_name = input.ident.clone();

    // derive handle name: FooEvent -> FooHandle
    let enum_name_str = enum_name.to_string();
    let handle_name_str = match enum_name_str.strip_suffix("Event") {
        Some(stem) => format!("{stem}Handle"),
        None => format!("{enum_name_str}Handle"),
    };
    let handle_ident = syn::Ident::new(&handle_name_str, enum_name.span());

    let variants = if let Data::Enum(ref e) = input.data {
        &e.variants
    } else {
        return syn::Error::new_spanned(&input, "Handle can only be derived for enums")
            .to_compile_error()
            .into();
    };

    let methods = variants.iter().map(|v| {
        let variant_name = &v.ident;
        let method_name = syn::Ident::new(&to_snake_case(&variant_name.to_string()), variant_name.span());

        match &v.fields {
            Fields::Named(fields_named) => {
                let reply = fields_named.named.iter().find_map(reply_type);
                let args = fields_named.named.iter().filter(|f| !is_reply(f)).map(|f| {
                    let name = &f.ident;
                    let ty = &f.ty;
                    quote! { #name: #ty }
                });
                let arg_names = fields_named.named.iter().filter(|f| !is_reply(f)).map(|f| &f.ident);

                match reply {
                    Some(reply_ty) => quote! {
                        pub async fn #method_name(&self, #( #args ),* ) -> Result<#reply_ty> {
                            let (reply, rx) = tokio::sync::oneshot::channel();
                            self.tx.send(#enum_name::#variant_name { #( #arg_names, )* reply }).await?;
                            Ok(rx.await?)
                        }
                    },
                    None => quote! {
                        pub async fn #method_name(&self, #( #args ),* ) -> Result<()> {
                            self.tx.send(#enum_name::#variant_name { #( #arg_names ),* }).await?;
                            Ok(())
                        }
                    },
                }
            }
            Fields::Unnamed(fields_unnamed) => {
                let args = fields_unnamed.unnamed.iter().enumerate().map(|(i, f)| {
                    let name = syn::Ident::new(&format!("arg{i}"), f.span());
                    let ty = &f.ty;
                    quote! { #name: #ty }
                });
                let arg_names = fields_unnamed
                    .unnamed
                    .iter()
                    .enumerate()
                    .map(|(i, f)| syn::Ident::new(&format!("arg{i}"), f.span()));

                quote! {
                    pub async fn #method_name(&self, #( #args ),* ) -> Result<()> {
                        self.tx.send(#enum_name::#variant_name( #( #arg_names ),* )).await?;
                        Ok(())
                    }
                }
            }
            Fields::Unit => {
                quote! {
                    pub async fn #method_name(&self) -> Result<()> {
                        self.tx.send(#enum_name::#variant_name).await?;
                        Ok(())
                    }
                }
            }
        }
    });

    let expanded = quote! {
        #[derive(Debug, Clone)]
        pub struct #handle_ident {
            tx: tokio::sync::mpsc::Sender<#enum_name>,
        }

        impl #handle_ident {
            #( #methods )*

            /// false once the actor dropped its receiver
            pub fn is_alive(&self) -> bool {
                !self.tx.is_closed()
            }
        }
    };

    TokenStream::from(expanded)
}

fn is_reply(field: &Field) -> bool {
    reply_type(field).is_some()
}

/// `T` when the field is `reply: ...::Sender<T>`
fn reply_type(field: &Field) -> Option<&Type> {
    if field.ident.as_ref()? != "reply" {
        return None;
    }
    let Type::Path(path) = &field.ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != "Sender" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    }
}

// simple CamelCase -> snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                result.push('_');
            }
            result.push(ch.to_ascii_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
